use contentdeck::RateLimitState;
use serde::Serialize;
use tabled::Tabled;

use crate::commands::shared::{Context, OutputFormat, format_duration, print_rows};

/// Rate limit information for display.
#[derive(Debug, Clone, Serialize, Tabled)]
pub(crate) struct RateLimitDisplay {
    #[tabled(rename = "Repository")]
    pub repository: String,
    #[tabled(rename = "Remaining")]
    pub remaining: String,
    #[tabled(rename = "Resets At")]
    pub reset_at: String,
    #[tabled(rename = "Resets In")]
    pub reset_in: String,
}

impl RateLimitDisplay {
    pub(crate) fn new(
        repository: String,
        state: &RateLimitState,
        now: chrono::DateTime<chrono::Utc>,
    ) -> Self {
        let reset_at = state.reset_at();
        let reset_in = match reset_at {
            Some(at) if at > now => format_duration(at.signed_duration_since(now)),
            Some(_) => "now".to_string(),
            None => "-".to_string(),
        };

        Self {
            repository,
            remaining: state
                .remaining
                .map_or_else(|| "unknown".to_string(), |r| r.to_string()),
            reset_at: reset_at
                .map(|at| at.format("%Y-%m-%d %H:%M:%S UTC").to_string())
                .unwrap_or_else(|| "-".to_string()),
            reset_in,
        }
    }
}

/// Handle `contentdeck limits`.
///
/// The budget is read from the headers of a repository lookup, which costs
/// one request.
pub(crate) async fn handle_limits(
    output: OutputFormat,
    ctx: &Context,
) -> Result<(), Box<dyn std::error::Error>> {
    let repository = ctx.client.repository().await?;
    let state = ctx.client.queue().rate_limit();
    let display = RateLimitDisplay::new(repository.full_name, &state, chrono::Utc::now());
    print_rows(&[display], output);
    Ok(())
}
