use crate::data::model::{FieldSample, SimulationDataset, TimeStep};
use crate::foundation::core::{Aabb3, Vec3, bounds_of};
use crate::foundation::error::{VisError, VisResult};
use crate::foundation::math::percentile_sorted;
use crate::normalize::params::{NormalizationParams, NormalizeOpts};

/// Compute the global normalization parameters of a dataset.
///
/// Every aggregate is either a sort or a min/max fold, so the result does not depend on the order
/// in which time-steps are visited.
#[tracing::instrument(skip_all, fields(steps = dataset.len()))]
pub fn normalize(
    dataset: &SimulationDataset,
    opts: &NormalizeOpts,
) -> VisResult<NormalizationParams> {
    let params = normalize_steps(dataset.steps().iter(), opts)?;
    tracing::info!(
        lo = params.value_domain[0],
        hi = params.value_domain[1],
        height_scale = params.height_scale,
        "normalization parameters computed"
    );
    Ok(params)
}

pub(crate) fn normalize_steps<'a>(
    steps: impl Iterator<Item = &'a TimeStep>,
    opts: &NormalizeOpts,
) -> VisResult<NormalizationParams> {
    opts.validate()?;

    let mut values: Vec<f64> = Vec::new();
    let mut step_count = 0usize;
    let mut t_min = f64::INFINITY;
    let mut t_max = f64::NEG_INFINITY;
    let mut sample_bounds: Option<Aabb3> = None;
    let mut marker_bounds: Option<Aabb3> = None;
    let mut any_surface = false;
    let mut any_vector = false;

    for step in steps {
        step_count += 1;
        t_min = t_min.min(step.time);
        t_max = t_max.max(step.time);

        let field_values = step.field.values();
        values.extend(field_values.encoded_iter().filter(|v| v.is_finite()));
        if field_values.is_vector() {
            any_vector = true;
        } else if matches!(step.field, FieldSample::Grid { .. }) {
            any_surface = true;
        }

        sample_bounds = merge(sample_bounds, bounds_of(step.field.positions()));
        let markers = bounds_of(step.markers.iter().map(|m| m.position));
        marker_bounds = merge(marker_bounds, markers);
    }

    if step_count == 0 {
        return Err(VisError::empty_dataset("dataset has zero time-steps"));
    }
    if values.is_empty() {
        return Err(VisError::empty_dataset(format!(
            "no finite field values in {step_count} time-step(s)"
        )));
    }

    values.sort_by(f64::total_cmp);
    let value_domain = value_domain(&values, opts);
    let max_abs = value_domain[0].abs().max(value_domain[1].abs());

    let base = match merge(sample_bounds, marker_bounds) {
        Some(b) => b,
        None => Aabb3::point(Vec3::ZERO),
    };
    let extent = base.horizontal_extent().max(1e-9);

    let height_scale = if any_surface && max_abs > 0.0 {
        opts.height_fraction * extent / max_abs
    } else {
        0.0
    };
    let vector_scale = if any_vector && value_domain[1] > 0.0 {
        opts.glyph_fraction * extent / value_domain[1]
    } else {
        0.0
    };

    let mut spatial_bounds = base;
    if height_scale > 0.0 {
        let c = base.center();
        spatial_bounds.include(Vec3::new(c.x, c.y, value_domain[0] * height_scale));
        spatial_bounds.include(Vec3::new(c.x, c.y, value_domain[1] * height_scale));
    }

    Ok(NormalizationParams {
        value_domain,
        spatial_bounds,
        trajectory_bounds: marker_bounds,
        height_scale,
        vector_scale,
        time_range: [t_min, t_max],
        step_count,
    })
}

fn merge(a: Option<Aabb3>, b: Option<Aabb3>) -> Option<Aabb3> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.union(b)),
        (a, None) => a,
        (None, b) => b,
    }
}

fn value_domain(sorted: &[f64], opts: &NormalizeOpts) -> [f64; 2] {
    let (mut lo, mut hi) = match opts.clip_percentile {
        Some(p) => (
            percentile_sorted(sorted, p).unwrap_or(0.0),
            percentile_sorted(sorted, 100.0 - p).unwrap_or(0.0),
        ),
        None => (sorted[0], sorted[sorted.len() - 1]),
    };
    if opts.symmetric {
        let m = lo.abs().max(hi.abs());
        (lo, hi) = (-m, m);
    }
    if let Some([a, b]) = opts.domain_override {
        (lo, hi) = (a, b);
    }
    if hi - lo <= 1e-12 * lo.abs().max(1.0) {
        tracing::warn!(lo, hi, "degenerate value domain widened by 0.5");
        (lo, hi) = (lo - 0.5, hi + 0.5);
    }
    [lo, hi]
}

#[cfg(test)]
#[path = "../../tests/unit/normalize/compute.rs"]
mod tests;
