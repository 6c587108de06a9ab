use async_trait::async_trait;
use scripted_table::TableHandle;

use crate::client::{ChannelConnection, ChannelError, Connector};

/// Connects agents straight to an in-process scripted table.
#[derive(Debug, Clone)]
pub struct TableConnector {
    table: TableHandle,
}

impl TableConnector {
    #[must_use]
    pub fn new(table: TableHandle) -> Self {
        Self { table }
    }
}

#[async_trait]
impl Connector for TableConnector {
    async fn connect(&self, label: &str) -> Result<ChannelConnection, ChannelError> {
        let (commands, events) = self.table.attach(label);
        Ok(ChannelConnection::from_parts(label, commands, events))
    }
}
