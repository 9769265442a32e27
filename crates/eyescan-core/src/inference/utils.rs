//! Shared inference utilities.

use candle_core::Tensor;

/// Sigmoid activation function.
#[inline]
#[must_use]
pub fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// Element-wise sigmoid built from differentiable primitives.
///
/// # Errors
///
/// Returns an error if a tensor op fails.
pub fn sigmoid_tensor(x: &Tensor) -> candle_core::Result<Tensor> {
    (x.neg()?.exp()? + 1.0)?.recip()
}

/// Numerically stable softmax over two logits.
#[must_use]
pub fn softmax2(logits: [f32; 2]) -> [f32; 2] {
    let max = logits[0].max(logits[1]);
    let e0 = (logits[0] - max).exp();
    let e1 = (logits[1] - max).exp();
    let sum = e0 + e1;
    [e0 / sum, e1 / sum]
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::Device;

    #[test]
    fn test_sigmoid() {
        assert!((sigmoid(0.0) - 0.5).abs() < 1e-6);
        assert!(sigmoid(10.0) > 0.999);
        assert!(sigmoid(-10.0) < 0.001);
    }

    #[test]
    fn test_softmax2_sums_to_one() {
        for logits in [[0.0, 0.0], [3.0, -2.0], [-50.0, 80.0], [1e4, 1e4 - 1.0]] {
            let p = softmax2(logits);
            assert!((p[0] + p[1] - 1.0).abs() < 1e-6, "{logits:?} -> {p:?}");
            assert!(p.iter().all(|v| v.is_finite()));
        }
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn test_sigmoid_tensor_matches_scalar() {
        let t = Tensor::new(&[-2.0f32, 0.0, 1.5], &Device::Cpu).unwrap();
        let out = sigmoid_tensor(&t).unwrap().to_vec1::<f32>().unwrap();
        for (x, y) in [-2.0f32, 0.0, 1.5].iter().zip(out) {
            assert!((sigmoid(*x) - y).abs() < 1e-6);
        }
    }
}
