//! Integration tests against in-memory platform fakes

mod fakes;
mod test_context;
mod test_fsm;
mod test_lifecycle;
