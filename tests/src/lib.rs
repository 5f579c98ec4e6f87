pub mod mock_upstream;
pub mod mock_webhook;
pub mod utils;
