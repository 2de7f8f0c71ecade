//! Identifier exchange contracts
//!
//! Exchangers turn locally scoped names carried by spans and references into
//! globally unique ids, mutating the view in place. `false` means "not
//! resolvable yet": an expected outcome that sends the segment down the
//! buffer path. Callers treat every `false` alike.

use async_trait::async_trait;

use super::decorator::{ReferenceDecorator, SpanDecorator};

#[async_trait]
pub trait SpanIdExchanger: Send + Sync {
    async fn exchange(&self, span: &mut SpanDecorator<'_>, application_id: i32) -> bool;
}

#[async_trait]
pub trait ReferenceIdExchanger: Send + Sync {
    async fn exchange(&self, reference: &mut ReferenceDecorator<'_>, application_id: i32)
    -> bool;
}
