//! Integration tests that call the real Claude API.
//!
//! These tests require ANTHROPIC_API_KEY to be set (via .env file or environment).
//! Run with: `cargo test -p storyloop-core --test api_integration -- --ignored`
//!
//! These are marked #[ignore] by default to avoid:
//! - API costs in CI
//! - Test failures when no API key is available
//! - Slow test runs (API calls take seconds)

use storyloop_core::testing::assert_alternating;
use storyloop_core::{MemoryStorage, Phase, SessionStore, StoryConfig, StorySession, INSULT_CHOICE};

/// Load environment variables from .env file
fn setup() {
    let _ = dotenvy::dotenv();
}

/// Check if API key is available
fn has_api_key() -> bool {
    std::env::var("ANTHROPIC_API_KEY").is_ok_and(|key| !key.trim().is_empty())
}

fn live_session() -> StorySession {
    let config = StoryConfig::from_env()
        .expect("Environment should be valid")
        .with_max_tokens(512);
    let narrator = config.build_narrator().expect("Failed to create narrator");
    assert!(!narrator.is_offline());
    StorySession::new(narrator, SessionStore::new(MemoryStorage::new()))
}

#[tokio::test]
#[ignore] // Run with: cargo test -p storyloop-core --test api_integration -- --ignored
async fn test_live_opening_segment() {
    setup();
    if !has_api_key() {
        eprintln!("Skipping test: ANTHROPIC_API_KEY not set");
        return;
    }

    let mut session = live_session();
    session.begin().await.expect("begin should be accepted");

    assert_eq!(session.phase(), Phase::Ready, "error: {:?}", session.last_error());
    assert!(!session.choices().is_empty());
    println!("{}", session.export());
    println!("Choices: {:?}", session.choices());
}

#[tokio::test]
#[ignore]
async fn test_live_three_turns() {
    setup();
    if !has_api_key() {
        eprintln!("Skipping test: ANTHROPIC_API_KEY not set");
        return;
    }

    let mut session = live_session();
    session.begin().await.expect("begin should be accepted");

    for turn in 0..3 {
        assert_eq!(session.phase(), Phase::Ready, "turn {turn}: {:?}", session.last_error());
        let choice = if turn == 1 {
            INSULT_CHOICE.to_string()
        } else {
            session.choices()[0].clone()
        };
        session.pick(&choice).await.expect("pick should be accepted");
        assert_alternating(session.transcript());
    }

    println!("{}", session.export());
}
