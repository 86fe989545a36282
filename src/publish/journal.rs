use log::{info, warn};

use crate::{error::ConsumerError, event::CosmicEvent, publish::Consumer};

/// [Journal] reports every event in the application log
#[derive(Debug, Default)]
pub struct Journal {
    count: u64,
}

impl Journal {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Consumer for Journal {
    fn name(&self) -> &str {
        "journal"
    }

    async fn on_event(&mut self, event: &CosmicEvent) -> Result<(), ConsumerError> {
        self.count += 1;

        if event.fix.checksum_valid {
            info!("#{} {}", self.count, event);
        } else {
            warn!("#{} {}", self.count, event);
        }
        Ok(())
    }
}
