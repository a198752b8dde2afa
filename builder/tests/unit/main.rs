//! Integration tests

mod test_app;
mod test_executor;
mod test_fsm;
mod test_http_client;
mod test_publisher;
mod test_server;
