use clap::Args;
use repodoc_core::{Collection, ReconcilingClient, StoreStatus};

use repodoc::config::Config;

#[derive(Args)]
pub struct StatusCommand {
    /// Collection to count documents in
    #[arg(long, default_value = "patients")]
    pub collection: String,
}

impl StatusCommand {
    pub async fn run(
        &self,
        client: &ReconcilingClient,
        config: &Config,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let collection = Collection::new(&self.collection)?;

        println!("Store: {}", config.store_url.value);
        let status = client.sync().status(&collection).await;
        println!("Status: {}", status);

        match status {
            StoreStatus::Empty => {
                println!(
                    "\nNo documents in '{}' yet. Use 'repodoc put {}' to create one.",
                    collection, collection
                );
            }
            StoreStatus::CredentialsRejected => {
                return Err("The store rejected the configured token. Check 'repodoc config show'.".into());
            }
            StoreStatus::Unreachable(_) => {
                return Err(format!("Could not reach {}", config.store_url.value).into());
            }
            StoreStatus::Ready { .. } => {}
        }

        let pending = client.pending().len();
        if pending > 0 {
            println!("Pending deletions: {}", pending);
        }

        Ok(())
    }
}
