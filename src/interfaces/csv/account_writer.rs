use crate::domain::account::Account;
use crate::error::Result;
use std::io::Write;

/// Writes account balances as `account,balance` CSV.
pub struct AccountWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> AccountWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(sink),
        }
    }

    pub fn write_accounts(&mut self, accounts: impl IntoIterator<Item = Account>) -> Result<()> {
        for account in accounts {
            self.writer.serialize(account)?;
        }
        self.writer.flush()?;
        Ok(())
    }
}
