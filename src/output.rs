//! Rendering of a finished search for the terminal.

use clap::ValueEnum;

use crate::types::{PeerCandidate, SearchResult};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// One peer per line, ready for a vars file
    #[default]
    List,
    /// A single comma separated line
    String,
    /// The full search result as JSON
    Json,
}

pub fn peers_to_comma_separated(peers: &[PeerCandidate]) -> String {
    peers
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

pub fn render(result: &SearchResult, format: OutputFormat) -> Result<String, serde_json::Error> {
    Ok(match format {
        OutputFormat::List => result
            .peers
            .iter()
            .map(|peer| format!("- {}", peer))
            .collect::<Vec<_>>()
            .join("\n"),
        OutputFormat::String => format!(
            "Comma-Separated Peers:\n{}",
            peers_to_comma_separated(&result.peers)
        ),
        OutputFormat::Json => serde_json::to_string_pretty(result)?,
    })
}
