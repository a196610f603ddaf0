use anyhow::Result;

use super::Notifier;

/// Prints notifications; used for dry runs and local testing.
pub struct StdoutNotifier;

#[async_trait::async_trait]
impl Notifier for StdoutNotifier {
    fn name(&self) -> &str {
        "stdout"
    }

    async fn send(&self, text: &str) -> Result<()> {
        println!("🔔 {text}");
        Ok(())
    }
}
