use crate::domain::events::InboxMessage;
use crate::error::{PaymentError, Result};
use std::io::{BufRead, BufReader, Read};

/// Reads inbox messages from a JSON-lines source, one object per line.
///
/// Blank lines are skipped. A malformed line yields an error for that line
/// and reading continues with the next one.
pub struct MessageReader<R: Read> {
    reader: BufReader<R>,
}

impl<R: Read> MessageReader<R> {
    pub fn new(source: R) -> Self {
        Self {
            reader: BufReader::new(source),
        }
    }

    pub fn messages(self) -> impl Iterator<Item = Result<InboxMessage>> {
        self.reader.lines().filter_map(|line| match line {
            Ok(line) if line.trim().is_empty() => None,
            Ok(line) => Some(serde_json::from_str(&line).map_err(PaymentError::from)),
            Err(e) => Some(Err(PaymentError::from(e))),
        })
    }
}
