// Aggregator: completion-order outcomes -> submission-order response

use crate::core::errors::{PipelineError, PipelineResult};
use crate::core::types::{BatchResponse, ItemOutcome};

/// Place each outcome at its item's index.
///
/// Exactly one outcome per index in `0..expected` is required; anything else
/// is an internal fault, never a partial response.
pub fn assemble<I>(expected: usize, outcomes: I) -> PipelineResult<BatchResponse>
where
    I: IntoIterator<Item = (usize, ItemOutcome)>,
{
    let mut slots: Vec<Option<ItemOutcome>> = vec![None; expected];

    for (index, outcome) in outcomes {
        let slot = slots.get_mut(index).ok_or(PipelineError::OutcomeOutOfRange {
            index,
            len: expected,
        })?;
        if slot.is_some() {
            return Err(PipelineError::DuplicateOutcome { index });
        }
        *slot = Some(outcome);
    }

    let results = slots
        .into_iter()
        .enumerate()
        .map(|(index, slot)| slot.ok_or(PipelineError::MissingOutcome { index }))
        .collect::<PipelineResult<Vec<_>>>()?;

    Ok(BatchResponse { results })
}
