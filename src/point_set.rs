use crate::error::{Error, Result};

/// Immutable storage of `N` points in `D` dimensions.
///
/// Coordinates are kept row-major in one flat buffer. Point identifiers are the
/// row positions `0..N` in the order the rows were supplied.
#[derive(Debug, Clone, PartialEq)]
pub struct PointSet {
    dimensions: usize,
    coords: Vec<f64>,
}

impl PointSet {
    /// Build a point set from rows of `dimensions` coordinates each.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Shape`] if `rows` is empty, if `dimensions` is zero, if
    /// any row does not have exactly `dimensions` coordinates or if a coordinate
    /// is NaN or infinite.
    pub fn build<R>(rows: &[R], dimensions: usize) -> Result<PointSet>
    where
        R: AsRef<[f64]>,
    {
        if rows.is_empty() {
            return Err(Error::Shape("cannot build a point set from zero rows".into()));
        }
        if dimensions == 0 {
            return Err(Error::Shape("points must have at least one dimension".into()));
        }

        let mut coords = Vec::with_capacity(rows.len() * dimensions);
        for (i, row) in rows.iter().enumerate() {
            let row = row.as_ref();
            if row.len() != dimensions {
                return Err(Error::Shape(format!(
                    "row {i} has {} coordinates, expected {dimensions}",
                    row.len()
                )));
            }
            if let Some(x) = row.iter().find(|x| !x.is_finite()) {
                return Err(Error::Shape(format!("row {i} has non-finite coordinate {x}")));
            }
            coords.extend_from_slice(row);
        }

        Ok(PointSet { dimensions, coords })
    }

    /// The coordinates of point `i`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OutOfRange`] if `i >= self.len()`.
    pub fn get(&self, i: usize) -> Result<&[f64]> {
        if i >= self.len() {
            return Err(Error::OutOfRange {
                index: i,
                len: self.len(),
            });
        }
        Ok(self.point(i))
    }

    // Unchecked access for the index backends, which only hold valid ids.
    #[inline]
    pub(crate) fn point(&self, i: usize) -> &[f64] {
        &self.coords[i * self.dimensions..(i + 1) * self.dimensions]
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.coords.len() / self.dimensions
    }

    /// Always `false`: a point set holds at least one point.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.coords.is_empty()
    }

    #[must_use]
    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// Iterate over the points in identifier order.
    pub fn iter(&self) -> impl Iterator<Item = &[f64]> + '_ {
        self.coords.chunks_exact(self.dimensions)
    }

    /// A new point set holding the first `dimensions` coordinates of every point.
    ///
    /// Used to sweep dimensionality over a single dataset.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Shape`] if `dimensions` is zero or exceeds the current
    /// dimensionality.
    pub fn select_dimensions(&self, dimensions: usize) -> Result<PointSet> {
        if dimensions == 0 || dimensions > self.dimensions {
            return Err(Error::Shape(format!(
                "cannot select {dimensions} of {} dimensions",
                self.dimensions
            )));
        }
        let coords = self
            .iter()
            .flat_map(|point| point[..dimensions].iter().copied())
            .collect();
        Ok(PointSet { dimensions, coords })
    }
}

#[cfg(test)]
mod tests {
    use super::PointSet;
    use crate::Error;

    #[test]
    fn build_and_get() {
        let points = PointSet::build(&[[0.0, 1.0], [2.0, 3.0], [4.0, 5.0]], 2).unwrap();
        assert_eq!(points.len(), 3);
        assert_eq!(points.dimensions(), 2);
        assert_eq!(points.get(1).unwrap(), &[2.0, 3.0]);
        assert_eq!(
            points.get(3),
            Err(Error::OutOfRange { index: 3, len: 3 })
        );
        assert_eq!(points.iter().count(), 3);
    }

    #[test]
    fn shape_errors() {
        let empty: Vec<Vec<f64>> = Vec::new();
        assert!(matches!(PointSet::build(&empty, 2), Err(Error::Shape(_))));
        assert!(matches!(
            PointSet::build(&[vec![1.0, 2.0], vec![1.0, 2.0, 3.0]], 2),
            Err(Error::Shape(_))
        ));
        assert!(matches!(PointSet::build(&[[1.0]], 0), Err(Error::Shape(_))));
    }

    #[test]
    fn non_finite_coordinates() {
        for bad in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            assert!(matches!(
                PointSet::build(&[[bad, 0.0], [1.0, 1.0], [2.0, 2.0]], 2),
                Err(Error::Shape(_))
            ));
        }
    }

    #[test]
    fn select_dimensions() {
        let points = PointSet::build(&[[0.0, 1.0, 2.0], [3.0, 4.0, 5.0]], 3).unwrap();
        let projected = points.select_dimensions(2).unwrap();
        assert_eq!(projected.dimensions(), 2);
        assert_eq!(projected.get(1).unwrap(), &[3.0, 4.0]);
        assert!(points.select_dimensions(4).is_err());
        assert!(points.select_dimensions(0).is_err());
    }
}
