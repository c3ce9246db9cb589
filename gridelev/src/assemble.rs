//! Scatter per-tile results back into input order.

use crate::error::{IntegrityError, Result};
use crate::tile_index::TileId;

/// Values sampled for one tile group.
///
/// `values[i]` belongs to the point at original position `indices[i]`.
#[derive(Debug, Clone)]
pub struct SampledGroup {
    pub tile: TileId,
    pub indices: Vec<usize>,
    pub values: Vec<Option<f64>>,
}

/// Build the output vector of length `total`.
///
/// Every index in `0..total` must be covered exactly once, either by a
/// sampled group or by `unresolved` (which receive `None`). Anything else
/// is reported as an [`IntegrityError`].
pub fn assemble(
    groups: &[SampledGroup],
    unresolved: &[usize],
    total: usize,
) -> Result<Vec<Option<f64>>> {
    let mut values = vec![None; total];
    let mut written = vec![false; total];

    let mut mark = |index: usize| -> std::result::Result<(), IntegrityError> {
        let slot = written
            .get_mut(index)
            .ok_or(IntegrityError::IndexOutOfRange { index, total })?;
        if *slot {
            return Err(IntegrityError::DuplicateWrite { index });
        }
        *slot = true;
        Ok(())
    };

    for group in groups {
        if group.values.len() != group.indices.len() {
            return Err(IntegrityError::SampleCountMismatch {
                tile: group.tile.to_string(),
                expected: group.indices.len(),
                actual: group.values.len(),
            }
            .into());
        }
        for (&index, &value) in group.indices.iter().zip(&group.values) {
            mark(index)?;
            values[index] = value;
        }
    }

    for &index in unresolved {
        mark(index)?;
    }

    if let Some(index) = written.iter().position(|w| !w) {
        return Err(IntegrityError::MissingWrite { index }.into());
    }

    Ok(values)
}
