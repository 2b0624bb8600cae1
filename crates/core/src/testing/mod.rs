//! Test doubles for the auth ports
//!
//! Available to other crates behind the `test-utils` feature.

mod mocks;

pub use mocks::{
    sample_server_config, token_response, FrameScript, MockOAuthClient, RecordingNavigator,
    RecordingRelay, ScriptedFrameHost, TEST_ISSUER,
};
