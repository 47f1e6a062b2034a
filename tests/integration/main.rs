mod decision_flow;
mod mock_source;
mod profit_flow;
