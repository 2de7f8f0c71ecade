//! Register-backed identifier exchangers

use std::sync::Arc;

use async_trait::async_trait;

use super::{RegisterService, UNRESOLVED_ID};
use crate::core::constants::DOMAIN_OPERATION_NAME;
use crate::domain::segment::decorator::{ReferenceDecorator, SpanDecorator};
use crate::domain::segment::exchange::{ReferenceIdExchanger, SpanIdExchanger};

pub struct RegisterSpanIdExchanger {
    register: Arc<RegisterService>,
}

impl RegisterSpanIdExchanger {
    pub fn new(register: Arc<RegisterService>) -> Self {
        Self { register }
    }
}

/// Every unresolved field is looked up, even after one of them came back
/// unresolved, so all unknown names of a span are queued in a single pass.
#[async_trait]
impl SpanIdExchanger for RegisterSpanIdExchanger {
    async fn exchange(&self, span: &mut SpanDecorator<'_>, application_id: i32) -> bool {
        let mut resolved = true;

        if span.component_id() == UNRESOLVED_ID && !span.component().is_empty() {
            let component_id = self.register.get_or_create_component(span.component());
            if component_id == UNRESOLVED_ID {
                resolved = false;
            } else {
                span.set_component_id(component_id);
            }
        }

        if span.peer_id() == UNRESOLVED_ID && !span.peer().is_empty() {
            let peer_id = self.register.get_or_create_network_address(span.peer());
            if peer_id == UNRESOLVED_ID {
                resolved = false;
            } else {
                span.set_peer_id(peer_id);
            }
        }

        if span.operation_name_id() == UNRESOLVED_ID {
            let operation_name = if span.operation_name().is_empty() {
                DOMAIN_OPERATION_NAME
            } else {
                span.operation_name()
            };
            let operation_name_id = self
                .register
                .get_or_create_operation_name(application_id, operation_name);
            if operation_name_id == UNRESOLVED_ID {
                resolved = false;
            } else {
                span.set_operation_name_id(operation_name_id);
            }
        }

        resolved
    }
}

pub struct RegisterReferenceIdExchanger {
    register: Arc<RegisterService>,
}

impl RegisterReferenceIdExchanger {
    pub fn new(register: Arc<RegisterService>) -> Self {
        Self { register }
    }
}

#[async_trait]
impl ReferenceIdExchanger for RegisterReferenceIdExchanger {
    async fn exchange(
        &self,
        reference: &mut ReferenceDecorator<'_>,
        application_id: i32,
    ) -> bool {
        let mut resolved = true;

        if reference.entry_service_id() == UNRESOLVED_ID
            && !reference.entry_service_name().is_empty()
        {
            let entry_service_id = self
                .register
                .get_or_create_operation_name(application_id, reference.entry_service_name());
            if entry_service_id == UNRESOLVED_ID {
                resolved = false;
            } else {
                reference.set_entry_service_id(entry_service_id);
            }
        }

        if reference.parent_service_id() == UNRESOLVED_ID
            && !reference.parent_service_name().is_empty()
        {
            let parent_service_id = self
                .register
                .get_or_create_operation_name(application_id, reference.parent_service_name());
            if parent_service_id == UNRESOLVED_ID {
                resolved = false;
            } else {
                reference.set_parent_service_id(parent_service_id);
            }
        }

        if reference.network_address_id() == UNRESOLVED_ID
            && !reference.network_address().is_empty()
        {
            let network_address_id = self
                .register
                .get_or_create_network_address(reference.network_address());
            if network_address_id == UNRESOLVED_ID {
                resolved = false;
            } else {
                reference.set_network_address_id(network_address_id);
            }
        }

        resolved
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::segment::decorator::SegmentDecorator;
    use crate::domain::segment::proto::{SpanObject, TraceSegmentObject, TraceSegmentReference};

    fn segment() -> SegmentDecorator {
        SegmentDecorator::new(TraceSegmentObject {
            application_id: 3,
            spans: vec![SpanObject {
                operation_name: "/orders".to_string(),
                peer: "db:3306".to_string(),
                component: "mysql".to_string(),
                refs: vec![TraceSegmentReference {
                    parent_service_name: "/checkout".to_string(),
                    network_address: "10.0.0.1:8080".to_string(),
                    ..Default::default()
                }],
                ..Default::default()
            }],
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn test_span_exchange_pending_then_resolved() {
        let register = Arc::new(RegisterService::new());
        let exchanger = RegisterSpanIdExchanger::new(register.clone());
        let mut segment = segment();

        assert!(!exchanger.exchange(&mut segment.span(0), 3).await);
        // Component, peer and operation name are all queued at once
        assert_eq!(register.pending_count(), 3);

        assert_eq!(register.process_pending(), 3);
        assert!(exchanger.exchange(&mut segment.span(0), 3).await);

        let span = segment.span(0);
        assert!(span.component_id() > 0);
        assert!(span.peer_id() > 0);
        assert!(span.operation_name_id() > 0);
        assert_eq!(span.operation_name(), "");
    }

    #[tokio::test]
    async fn test_span_exchange_empty_operation_name_uses_domain_name() {
        let register = Arc::new(RegisterService::new());
        register.get_or_create_operation_name(3, DOMAIN_OPERATION_NAME);
        register.process_pending();

        let exchanger = RegisterSpanIdExchanger::new(register.clone());
        let mut segment = SegmentDecorator::new(TraceSegmentObject {
            spans: vec![SpanObject::default()],
            ..Default::default()
        });

        assert!(exchanger.exchange(&mut segment.span(0), 3).await);
        assert_eq!(
            segment.span(0).operation_name_id(),
            register.get_or_create_operation_name(3, DOMAIN_OPERATION_NAME)
        );
    }

    #[tokio::test]
    async fn test_span_exchange_skips_resolved_ids() {
        let register = Arc::new(RegisterService::new());
        let exchanger = RegisterSpanIdExchanger::new(register.clone());
        let mut segment = SegmentDecorator::new(TraceSegmentObject {
            spans: vec![SpanObject {
                operation_name_id: 9,
                ..Default::default()
            }],
            ..Default::default()
        });

        assert!(exchanger.exchange(&mut segment.span(0), 3).await);
        assert_eq!(register.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_reference_exchange() {
        let register = Arc::new(RegisterService::new());
        let exchanger = RegisterReferenceIdExchanger::new(register.clone());
        let mut segment = segment();

        assert!(!exchanger.exchange(&mut segment.span(0).reference(0), 3).await);
        assert_eq!(register.pending_count(), 2);

        register.process_pending();
        assert!(exchanger.exchange(&mut segment.span(0).reference(0), 3).await);

        let mut span = segment.span(0);
        let reference = span.reference(0);
        assert!(reference.parent_service_id() > 0);
        assert!(reference.network_address_id() > 0);
        assert_eq!(reference.entry_service_id(), 0);
    }
}
