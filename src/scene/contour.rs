use crate::data::model::GridGeometry;
use crate::foundation::core::Vec3;

/// Marching-squares iso-lines of `values` at `level`, as segments in the z = 0 plane.
///
/// Cells touching a non-finite value are skipped. Saddle cells are disambiguated with the cell
/// average.
pub fn iso_segments(geometry: &GridGeometry, values: &[f64], level: f64) -> Vec<[Vec3; 2]> {
    let positions = geometry.node_positions();
    let mut out = Vec::new();

    for cell in geometry.cells() {
        let v = cell.map(|n| values[n]);
        if v.iter().any(|x| !x.is_finite()) {
            continue;
        }
        let p = cell.map(|n| positions[n]);

        let mut case = 0u8;
        for (k, &x) in v.iter().enumerate() {
            if x >= level {
                case |= 1 << k;
            }
        }
        if case == 0 || case == 15 {
            continue;
        }

        // Edge k joins corner k and corner (k + 1) % 4.
        let edge = |k: usize| -> Vec3 {
            let (a, b) = (k, (k + 1) % 4);
            let d = v[b] - v[a];
            let t = if d.abs() > f64::EPSILON {
                ((level - v[a]) / d).clamp(0.0, 1.0)
            } else {
                0.5
            };
            p[a] + (p[b] - p[a]) * t
        };

        let pairs: &[(usize, usize)] = match case {
            1 | 14 => &[(3, 0)],
            2 | 13 => &[(0, 1)],
            3 | 12 => &[(3, 1)],
            4 | 11 => &[(1, 2)],
            6 | 9 => &[(0, 2)],
            7 | 8 => &[(2, 3)],
            5 | 10 => {
                let center_high = (v[0] + v[1] + v[2] + v[3]) * 0.25 >= level;
                // Corners 0 and 2 share a side when case 5 has a high center.
                if (case == 5) == center_high {
                    &[(3, 2), (0, 1)]
                } else {
                    &[(3, 0), (1, 2)]
                }
            }
            _ => &[],
        };
        for &(a, b) in pairs {
            out.push([edge(a), edge(b)]);
        }
    }
    out
}

#[cfg(test)]
#[path = "../../tests/unit/scene/contour.rs"]
mod tests;
