use crate::domain::account::{AccountId, Amount};
use crate::domain::payment::Payment;
use crate::domain::state::PaymentStatus;
use crate::error::Result;
use serde::Serialize;
use std::io::Write;

#[derive(Serialize)]
struct PaymentRow<'a> {
    request_id: &'a str,
    status: PaymentStatus,
    amount: Amount,
    payer: &'a AccountId,
    payee: &'a AccountId,
    message: Option<&'a str>,
}

impl<'a> From<&'a Payment> for PaymentRow<'a> {
    fn from(payment: &'a Payment) -> Self {
        Self {
            request_id: &payment.request_id,
            status: payment.status,
            amount: payment.amount,
            payer: &payment.payer,
            payee: &payment.payee,
            message: payment.failure_message.as_deref(),
        }
    }
}

/// Writes one CSV row per saga with its final status and message.
pub struct PaymentWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> PaymentWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(sink),
        }
    }

    pub fn write_payments<'a>(&mut self, payments: impl IntoIterator<Item = &'a Payment>) -> Result<()> {
        for payment in payments {
            self.writer.serialize(PaymentRow::from(payment))?;
        }
        self.writer.flush()?;
        Ok(())
    }
}
