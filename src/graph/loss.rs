//! Losses and the metric registry

use burn::tensor::backend::Backend;
use burn::tensor::{ElementConversion, Tensor};

/// Mean squared error over every element, shape `[1]`.
pub fn mse<B: Backend, const D: usize>(target: Tensor<B, D>, prediction: Tensor<B, D>) -> Tensor<B, 1> {
    assert_eq!(
        target.dims(),
        prediction.dims(),
        "mse needs matching shapes"
    );
    (prediction - target).powf_scalar(2.0).mean()
}

/// KL divergence of `N(mu, exp(logvar))` from `N(0, 1)`, summed over time
/// and latent axes. Returns one value per batch element.
pub fn kl_unit_normal<B: Backend>(mu: Tensor<B, 3>, logvar: Tensor<B, 3>) -> Tensor<B, 1> {
    let batch = mu.dims()[0];
    let terms = logvar.clone().add_scalar(1.0) - mu.powf_scalar(2.0) - logvar.exp();
    terms.reshape([batch as i32, -1]).sum_dim(1).reshape([batch]).mul_scalar(-0.5)
}

/// Named scalar metrics in registration order.
///
/// Values are stored already mean-aggregated as `[1]` tensors so they stay
/// on the autodiff graph until read back.
#[derive(Debug, Clone)]
pub struct Metrics<B: Backend> {
    entries: Vec<(&'static str, Tensor<B, 1>)>,
}

impl<B: Backend> Default for Metrics<B> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: Backend> Metrics<B> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Registers `value` under `name`, averaging it to a scalar.
    ///
    /// # Panics
    /// If `name` is already registered.
    pub fn add<const D: usize>(&mut self, name: &'static str, value: Tensor<B, D>) {
        assert!(
            !self.contains(name),
            "metric `{}` registered twice",
            name
        );
        self.entries.push((name, value.mean()));
    }

    pub fn get(&self, name: &str) -> Option<&Tensor<B, 1>> {
        self.entries.iter().find(|(n, _)| *n == name).map(|(_, v)| v)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.entries.iter().map(|(n, _)| *n).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &Tensor<B, 1>)> {
        self.entries.iter().map(|(n, v)| (*n, v))
    }

    /// Reads every metric back to the host.
    pub fn to_scalars(&self) -> Vec<(&'static str, f32)> {
        self.entries
            .iter()
            .map(|(n, v)| (*n, v.clone().into_scalar().elem::<f32>()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use burn::tensor::{Distribution, TensorData};

    type Backend = NdArray<f32>;

    #[test]
    fn test_mse_value() {
        let device = Default::default();
        let target = Tensor::<Backend, 2>::from_data(TensorData::from([[0.0f32, 0.0], [0.0, 0.0]]), &device);
        let pred = Tensor::<Backend, 2>::from_data(TensorData::from([[1.0f32, -1.0], [2.0, 0.0]]), &device);

        let value: f32 = mse(target, pred).into_scalar();
        assert!((value - 1.5).abs() < 1e-6);
    }

    #[test]
    fn test_kl_of_standard_normal_is_zero() {
        let device = Default::default();
        let mu = Tensor::<Backend, 3>::zeros([4, 6, 3], &device);
        let logvar = Tensor::<Backend, 3>::zeros([4, 6, 3], &device);

        let kl = kl_unit_normal(mu, logvar);
        assert_eq!(kl.dims(), [4]);
        for v in kl.into_data().to_vec::<f32>().unwrap() {
            assert_eq!(v, 0.0);
        }
    }

    #[test]
    fn test_kl_is_positive_away_from_prior() {
        let device = Default::default();
        let mu = Tensor::<Backend, 3>::random([2, 3, 4], Distribution::Uniform(0.5, 1.0), &device);
        let logvar = Tensor::<Backend, 3>::zeros([2, 3, 4], &device);

        // With unit variance the KL is 0.5 * sum(mu^2).
        let expected = mu.clone().powf_scalar(2.0).sum_dim(2).sum_dim(1).reshape([2]).mul_scalar(0.5);
        let kl = kl_unit_normal(mu, logvar);
        let diff = (kl.clone() - expected).abs().max().into_scalar();
        assert!(diff < 1e-5);
        assert!(kl.min().into_scalar() > 0.0);
    }

    #[test]
    fn test_metrics_keep_order_and_mean() {
        let device = Default::default();
        let mut metrics = Metrics::<Backend>::new();
        metrics.add("b", Tensor::<Backend, 1>::from_data(TensorData::from([1.0f32, 3.0]), &device));
        metrics.add("a", Tensor::<Backend, 2>::ones([2, 2], &device));

        assert_eq!(metrics.names(), vec!["b", "a"]);
        assert_eq!(metrics.to_scalars(), vec![("b", 2.0), ("a", 1.0)]);
        assert!(metrics.contains("a"));
        assert!(!metrics.contains("kl_loss"));
    }

    #[test]
    #[should_panic(expected = "registered twice")]
    fn test_duplicate_metric_panics() {
        let device = Default::default();
        let mut metrics = Metrics::<Backend>::new();
        metrics.add("rec", Tensor::<Backend, 1>::zeros([1], &device));
        metrics.add("rec", Tensor::<Backend, 1>::zeros([1], &device));
    }
}
