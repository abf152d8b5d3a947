use glam::DMat3;

/// Copy a glam 3x3 matrix into an owned faer matrix.
pub(crate) fn dmat3_to_faer(m: &DMat3) -> faer::Mat<f64> {
    faer::Mat::from_fn(3, 3, |i, j| m.col(j)[i])
}

/// Copy the top-left 3x3 block of a faer matrix into a glam matrix.
pub(crate) fn faer_to_dmat3(m: faer::MatRef<'_, f64>) -> DMat3 {
    DMat3::from_cols_array(&[
        m.read(0, 0),
        m.read(1, 0),
        m.read(2, 0),
        m.read(0, 1),
        m.read(1, 1),
        m.read(2, 1),
        m.read(0, 2),
        m.read(1, 2),
        m.read(2, 2),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::linalg::mat3_from_rows;

    #[test]
    fn test_dmat3_to_faer() {
        let m = mat3_from_rows([[1.0, 2.0, 3.0], [4.0, 5.0, 6.0], [7.0, 8.0, 9.0]]);
        let f = dmat3_to_faer(&m);
        assert_eq!(f.read(0, 0), 1.0);
        assert_eq!(f.read(0, 1), 2.0);
        assert_eq!(f.read(0, 2), 3.0);
        assert_eq!(f.read(1, 0), 4.0);
        assert_eq!(f.read(2, 1), 8.0);
        assert_eq!(f.read(2, 2), 9.0);
    }

    #[test]
    fn test_faer_roundtrip() {
        let m = mat3_from_rows([[0.5, -1.0, 2.0], [3.0, 0.0, -4.0], [1.0, 1.0, 1.0]]);
        let back = faer_to_dmat3(dmat3_to_faer(&m).as_ref());
        assert_eq!(back, m);
    }
}
