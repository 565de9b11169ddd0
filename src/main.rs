//! editor_release - release build orchestrator for the editor.
//!
//! Builds the SDK, packages the editor, merges SDK and runtime into the
//! package archives and publishes them under a pinned and a latest prefix.

use editor_release::cli;
use editor_release::cli::OutputManager;
use std::process;

#[tokio::main]
async fn main() {
    match cli::run().await {
        Ok(exit_code) => {
            process::exit(exit_code);
        }
        Err(e) => {
            // Never quiet for fatal errors
            let output = OutputManager::new(false, false);
            output.error_block(&e.to_string());

            let suggestions = e.recovery_suggestions();
            if !suggestions.is_empty() {
                output.println("\n💡 Recovery suggestions:");
                for suggestion in suggestions {
                    output.indent(&suggestion);
                }
            }

            process::exit(e.exit_code());
        }
    }
}
