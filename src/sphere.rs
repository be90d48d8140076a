use conv::ValueFrom;

use crate::{
    distance::euclidean,
    error::{Error, Result},
    point_set::PointSet,
};

/// A ball around the centroid of a group of points.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Sphere {
    pub(crate) center: Vec<f64>,
    pub(crate) radius: f64,
}

impl Sphere {
    pub(crate) fn new(center: Vec<f64>, radius: f64) -> Sphere {
        Sphere { center, radius }
    }

    /// The smallest ball centered at the coordinate-wise mean of `ids` that
    /// contains all of them.
    pub(crate) fn enclosing(points: &PointSet, ids: &[usize]) -> Result<Sphere> {
        let mut center = vec![0.0; points.dimensions()];
        for &id in ids {
            for (c, x) in center.iter_mut().zip(points.point(id)) {
                *c += x;
            }
        }
        // Counts above 2^53 have no exact f64 representation.
        let weight = f64::value_from(ids.len())
            .map_err(|_| Error::Shape(format!("{} points cannot be averaged", ids.len())))?;
        for c in &mut center {
            *c /= weight;
        }

        let mut radius: f64 = 0.0;
        for &id in ids {
            radius = radius.max(euclidean(&center, points.point(id)));
        }

        Ok(Sphere::new(center, radius))
    }
}

#[cfg(test)]
mod tests {
    use super::Sphere;
    use crate::PointSet;

    #[test]
    fn enclosing() {
        let points = PointSet::build(
            &[[0.0, 0.0], [0.0, 2.0], [2.0, 0.0], [2.0, 2.0], [9.0, 9.0]],
            2,
        )
        .unwrap();
        let sphere = Sphere::enclosing(&points, &[0, 1, 2, 3]).unwrap();
        assert_eq!(sphere.center, vec![1., 1.]);
        assert_eq!(sphere.radius, 2.0_f64.sqrt());

        let single = Sphere::enclosing(&points, &[4]).unwrap();
        assert_eq!(single, Sphere::new(vec![9.0, 9.0], 0.0));
    }
}
