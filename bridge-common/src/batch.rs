use uuid::Uuid;

/// Batch metadata attached to every work unit assembled from one poll cycle.
/// Computed eagerly, in fetch-result order, before anything is dispatched, so
/// out-of-order completion cannot corrupt index assignment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchMetadata {
    /// Position of this unit within the batch, starting at zero.
    pub index: usize,
    /// Total number of units in the batch.
    pub size: usize,
    /// True only for the unit at index size - 1.
    pub is_last: bool,
    /// Identifier for the exchange carrying this unit through the pipeline.
    pub exchange_id: Uuid,
}

impl BatchMetadata {
    /// Units of this batch still waiting behind this one. The unit being
    /// handed off does not count itself, so the last unit reports zero.
    pub fn pending(&self) -> usize {
        self.size - self.index - 1
    }
}

/// One discrete item of fetched data, tagged with its batch metadata.
/// Consumed exactly once by the processing pipeline.
#[derive(Debug, Clone)]
pub struct WorkUnit<T> {
    pub item: T,
    pub metadata: BatchMetadata,
}

/// Wrap the surviving items of a fetch into numbered work units.
/// An empty input yields an empty batch, not an error.
pub fn assemble<T>(items: Vec<T>) -> Vec<WorkUnit<T>> {
    let size = items.len();

    items
        .into_iter()
        .enumerate()
        .map(|(index, item)| WorkUnit {
            item,
            metadata: BatchMetadata {
                index,
                size,
                is_last: index + 1 == size,
                exchange_id: Uuid::now_v7(),
            },
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assemble_numbers_units_in_order() {
        let units = assemble(vec!["a", "b", "c"]);

        assert_eq!(units.len(), 3);
        for (position, unit) in units.iter().enumerate() {
            assert_eq!(unit.metadata.index, position);
            assert_eq!(unit.metadata.size, 3);
            assert_eq!(unit.metadata.is_last, position == 2);
        }
        assert_eq!(units[0].item, "a");
        assert_eq!(units[2].item, "c");
    }

    #[test]
    fn test_pending_counts_down_to_zero_across_a_batch() {
        let units = assemble(vec!["a", "b", "c"]);

        let pending: Vec<usize> = units.iter().map(|u| u.metadata.pending()).collect();
        assert_eq!(pending, vec![2, 1, 0]);
        assert_eq!(units[2].metadata.pending(), 0);
        assert!(units[2].metadata.is_last);
    }

    #[test]
    fn test_assemble_single_unit_is_last() {
        let units = assemble(vec!["only"]);

        assert_eq!(units.len(), 1);
        assert_eq!(units[0].metadata.index, 0);
        assert_eq!(units[0].metadata.size, 1);
        assert!(units[0].metadata.is_last);
    }

    #[test]
    fn test_assemble_empty_batch_yields_no_units() {
        let units = assemble(Vec::<String>::new());
        assert!(units.is_empty());
    }

    #[test]
    fn test_exchange_ids_are_distinct() {
        let units = assemble(vec![1, 2]);
        assert_ne!(units[0].metadata.exchange_id, units[1].metadata.exchange_id);
    }
}
