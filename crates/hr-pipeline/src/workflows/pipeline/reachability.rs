use super::definition::{PipelineDefinition, PipelineStage};

/// Stages [`super::evaluate`] would accept from `current`, excluding `current` itself.
///
/// Ranked stages come first in ascending rank, absorbing stages follow in
/// declaration order.
pub fn next_states<S: PipelineStage>(
    definition: &PipelineDefinition<S>,
    current: S,
    high_water_mark: usize,
) -> Vec<S> {
    if definition.is_terminal(current) {
        return Vec::new();
    }

    let mut next: Vec<S> = if definition.is_absorbing(current) {
        definition
            .order()
            .iter()
            .copied()
            .filter(|stage| !definition.is_terminal(*stage))
            .filter(|stage| {
                definition
                    .index_of(*stage)
                    .is_some_and(|rank| rank <= high_water_mark)
            })
            .chain(definition.absorbing().iter().copied())
            .collect()
    } else {
        definition.transitions(current).into_iter().collect()
    };

    next.retain(|stage| *stage != current);
    next.sort_by_key(|stage| definition.sort_key(*stage));
    next.dedup();
    next
}
