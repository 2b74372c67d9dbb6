pub mod activation;
pub mod mock_engine;
