//! Eager fetch registration - bulk-completing virtual end-points
//!
//! An eager fetch loads the related rows for a whole set of owners in one
//! query. The grouped results are handed to the transaction here, completing
//! each owner's virtual end-point without a per-object load. Owners with no
//! fetched rows are completed as empty, so a later read does not fall back
//! to a lazy load.

use std::collections::HashMap;

use tracing::debug;

use crate::error::{RelationError, RelationResult};
use crate::identity::{ObjectId, RelationEndPointId};
use crate::mapping::Cardinality;
use crate::transaction::ClientTransaction;

/// Outcome of one eager fetch registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EagerFetchResult {
    /// End-points completed by this registration
    pub completed: usize,
    /// End-points that were already complete and were left untouched
    pub skipped: usize,
}

/// Complete the `property_name` end-point of every owner with the fetched
/// `(owner, related)` pairs.
///
/// Each end-point is completed at most once; owners whose end-point is
/// already complete keep their existing data. A fetched row claiming an
/// owner outside the requested set is a consistency error, as are two rows
/// claiming the same owner of a single-object relation.
pub fn register_fetched_relations(
    tx: &mut ClientTransaction,
    property_name: &str,
    owners: &[ObjectId],
    fetched: Vec<(ObjectId, ObjectId)>,
) -> RelationResult<EagerFetchResult> {
    let mut groups: HashMap<ObjectId, Vec<ObjectId>> = owners
        .iter()
        .map(|owner| (owner.clone(), Vec::new()))
        .collect();
    for (owner, related) in fetched {
        let group = groups.get_mut(&owner).ok_or_else(|| {
            RelationError::Consistency(format!(
                "Fetched row relates to '{}', which is not among the requested owners",
                owner
            ))
        })?;
        group.push(related);
    }

    let mut result = EagerFetchResult::default();
    for owner in owners {
        let id = RelationEndPointId::new(owner.clone(), property_name.to_string());
        let definition = tx
            .mapping()
            .end_point_definition(owner.class_name(), property_name)?;
        if !definition.is_virtual {
            return Err(RelationError::Usage(format!(
                "End-point '{}' is real; eager fetch completes virtual ends",
                id
            )));
        }
        let items = groups.remove(owner).unwrap_or_default();
        let completed = match definition.cardinality {
            Cardinality::Many => tx.manager_mut().mark_collection_data_complete(&id, items)?,
            Cardinality::One => {
                if items.len() > 1 {
                    return Err(RelationError::Consistency(format!(
                        "Eager fetch produced {} objects for single-object end-point '{}'",
                        items.len(),
                        id
                    )));
                }
                tx.manager_mut()
                    .mark_object_data_complete(&id, items.into_iter().next())?
            }
        };
        if completed {
            tx.notify_virtual_end_point_state_updated(&id, true);
            result.completed += 1;
        } else {
            result.skipped += 1;
        }
    }
    debug!(property = property_name, completed = result.completed, skipped = result.skipped,
        "registered eager fetch results");
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::InMemoryRelationSource;
    use crate::mapping::{MappingRegistry, RelationDefinition, RelationEndPointDefinition};
    use std::sync::Arc;

    fn mapping() -> Arc<MappingRegistry> {
        let registry = MappingRegistry::new();
        registry
            .register(RelationDefinition::new(
                "CustomerToOrder",
                RelationEndPointDefinition::real("Order", "Customer"),
                RelationEndPointDefinition::collection("Customer", "Orders"),
            ))
            .unwrap();
        Arc::new(registry)
    }

    fn one_to_one_mapping() -> Arc<MappingRegistry> {
        let registry = MappingRegistry::new();
        registry
            .register(RelationDefinition::new(
                "OrderToOrderTicket",
                RelationEndPointDefinition::real("OrderTicket", "Order"),
                RelationEndPointDefinition::virtual_object("Order", "OrderTicket"),
            ))
            .unwrap();
        Arc::new(registry)
    }

    #[test]
    fn test_fetch_completes_collections_without_loads() {
        let source = Arc::new(InMemoryRelationSource::new());
        let customer1 = ObjectId::new("Customer");
        let customer2 = ObjectId::new("Customer");
        let order1 = ObjectId::new("Order");
        let order2 = ObjectId::new("Order");

        let mut tx = ClientTransaction::new(mapping(), source.clone());
        let result = register_fetched_relations(
            &mut tx,
            "Orders",
            &[customer1.clone(), customer2.clone()],
            vec![
                (customer1.clone(), order1.clone()),
                (customer1.clone(), order2.clone()),
            ],
        )
        .unwrap();

        assert_eq!(result.completed, 2);
        assert_eq!(result.skipped, 0);
        let orders_end = RelationEndPointId::new(customer1, "Orders");
        assert_eq!(
            tx.get_related_objects(&orders_end).unwrap(),
            vec![order1, order2]
        );
        // the owner with no rows is complete as empty
        let empty_end = RelationEndPointId::new(customer2, "Orders");
        assert!(tx.get_related_objects(&empty_end).unwrap().is_empty());
        assert_eq!(source.load_count(), 0);
    }

    #[test]
    fn test_fetch_skips_already_complete_end_points() {
        let source = Arc::new(InMemoryRelationSource::new());
        let customer = ObjectId::new("Customer");
        let order = ObjectId::new("Order");
        source.put_related_objects(
            RelationEndPointId::new(customer.clone(), "Orders"),
            vec![order.clone()],
        );

        let mut tx = ClientTransaction::new(mapping(), source);
        let orders_end = RelationEndPointId::new(customer.clone(), "Orders");
        tx.ensure_data_complete(&orders_end).unwrap();

        let result =
            register_fetched_relations(&mut tx, "Orders", &[customer], vec![]).unwrap();
        assert_eq!(result.completed, 0);
        assert_eq!(result.skipped, 1);
        // the existing data wins over the later, empty registration
        assert_eq!(tx.get_related_objects(&orders_end).unwrap(), vec![order]);
    }

    #[test]
    fn test_fetch_rejects_row_for_unknown_owner() {
        let source = Arc::new(InMemoryRelationSource::new());
        let customer = ObjectId::new("Customer");
        let stranger = ObjectId::new("Customer");
        let order = ObjectId::new("Order");

        let mut tx = ClientTransaction::new(mapping(), source);
        let err = register_fetched_relations(
            &mut tx,
            "Orders",
            &[customer],
            vec![(stranger, order)],
        )
        .unwrap_err();
        assert!(matches!(err, RelationError::Consistency(_)));
    }

    #[test]
    fn test_fetch_rejects_double_claim_on_single_object_end() {
        let source = Arc::new(InMemoryRelationSource::new());
        let order = ObjectId::new("Order");
        let ticket1 = ObjectId::new("OrderTicket");
        let ticket2 = ObjectId::new("OrderTicket");

        let mut tx = ClientTransaction::new(one_to_one_mapping(), source);
        let err = register_fetched_relations(
            &mut tx,
            "OrderTicket",
            &[order.clone()],
            vec![(order.clone(), ticket1), (order, ticket2)],
        )
        .unwrap_err();
        assert!(matches!(err, RelationError::Consistency(_)));
    }

    #[test]
    fn test_fetch_rejects_real_end_points() {
        let source = Arc::new(InMemoryRelationSource::new());
        let order = ObjectId::new("Order");

        let mut tx = ClientTransaction::new(mapping(), source);
        let err =
            register_fetched_relations(&mut tx, "Customer", &[order], vec![]).unwrap_err();
        assert!(matches!(err, RelationError::Usage(_)));
    }
}
