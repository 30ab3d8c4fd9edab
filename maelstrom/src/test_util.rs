use ndarray as nd;

use crate::Float;

/// Elementwise closeness check, evaluated when dropped so tolerances can be
/// chained onto [`assert_all_close`].
pub struct AllCloseAssertion<'a, 'b, S1, S2, D>
where
    S1: nd::Data<Elem = Float>,
    S2: nd::Data<Elem = Float>,
    D: nd::Dimension,
{
    left: &'a nd::ArrayBase<S1, D>,
    right: &'b nd::ArrayBase<S2, D>,

    rel_tol: Option<Float>,
    abs_tol: Option<Float>,
}

impl<S1, S2, D> AllCloseAssertion<'_, '_, S1, S2, D>
where
    S1: nd::Data<Elem = Float>,
    S2: nd::Data<Elem = Float>,
    D: nd::Dimension,
{
    pub fn rel_tol(&mut self, rel_tol: Option<Float>) -> &mut Self {
        self.rel_tol = rel_tol;
        self
    }

    pub fn abs_tol(&mut self, abs_tol: Option<Float>) -> &mut Self {
        self.abs_tol = abs_tol;
        self
    }
}

impl<S1, S2, D> Drop for AllCloseAssertion<'_, '_, S1, S2, D>
where
    S1: nd::Data<Elem = Float>,
    S2: nd::Data<Elem = Float>,
    D: nd::Dimension,
{
    #[track_caller]
    fn drop(&mut self) {
        assert!(
            self.rel_tol.is_some() || self.abs_tol.is_some(),
            "At least one tolerance must be specified"
        );
        assert_eq!(self.left.shape(), self.right.shape(), "Shapes differ");
        let mut num_failures = 0;
        for ((index, left), right) in self.left.indexed_iter().zip(self.right.iter()) {
            let mut checker = approx::Relative::default();
            if let Some(rel_tol) = self.rel_tol {
                checker = checker.max_relative(rel_tol);
            }
            if let Some(abs_tol) = self.abs_tol {
                checker = checker.epsilon(abs_tol);
            }
            if !checker.eq(left, right) {
                if num_failures < 20 {
                    eprintln!("At {index:?}, left = {left:e}, right = {right:e}");
                }
                num_failures += 1;
            }
        }
        assert!(
            num_failures == 0,
            "Didn't match at {num_failures}/{} elements",
            self.left.len()
        );
    }
}

#[track_caller]
pub fn assert_all_close<'a, 'b, S1, S2, D>(
    left: &'a nd::ArrayBase<S1, D>,
    right: &'b nd::ArrayBase<S2, D>,
) -> AllCloseAssertion<'a, 'b, S1, S2, D>
where
    S1: nd::Data<Elem = Float>,
    S2: nd::Data<Elem = Float>,
    D: nd::Dimension,
{
    AllCloseAssertion {
        left,
        right,
        rel_tol: Some(1e-10),
        abs_tol: Some(0.),
    }
}
