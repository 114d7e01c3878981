use anyhow::{bail, Context, Result};
use tch::{kind::Kind, CModule, Device, Tensor};

use crate::error::ModelError;
use crate::features::FeatureVector;
use crate::model::Classifier;

/// TorchScript classifier. Output `[1, C]` (C >= 2) is read as class scores;
/// output `[1]` or `[1, 1]` as the class itself, with no probabilities.
pub struct TorchClassifier {
    model: CModule,
    device: Device,
    in_dim: usize,
    n_classes: i64,
}

impl TorchClassifier {
    pub fn load(model_path: &str, in_dim: usize) -> Result<Self> {
        let device = Device::Cpu;

        let model = CModule::load_on_device(model_path, device)
            .with_context(|| format!("failed to load TorchScript {}", model_path))?;

        // Probe output shape with a dummy forward
        let dummy = Tensor::zeros([1, in_dim as i64], (Kind::Float, device));
        let t = tch::no_grad(|| model.forward_ts(&[dummy]))?;
        let sz = t.size();
        let n_classes = match sz.as_slice() {
            [1] => 1,
            [1, c] if *c >= 1 => *c,
            _ => bail!("unexpected model output size: {:?}", sz),
        };

        Ok(Self {
            model,
            device,
            in_dim,
            n_classes,
        })
    }

    fn forward(&self, x: &FeatureVector) -> Result<Tensor, ModelError> {
        if x.len() != self.in_dim {
            return Err(ModelError::Inference(format!(
                "feature length mismatch: got {}, expected {}",
                x.len(),
                self.in_dim
            )));
        }

        let input = Tensor::from_slice(&x.to_f32())
            .reshape([1, self.in_dim as i64])
            .to_device(self.device);

        let t = tch::no_grad(|| self.model.forward_ts(&[input]))
            .map_err(|e| ModelError::Inference(e.to_string()))?;
        Ok(t.reshape([1, -1]))
    }
}

impl Classifier for TorchClassifier {
    fn predict(&self, x: &FeatureVector) -> Result<i64, ModelError> {
        let t = self.forward(x)?;
        if self.n_classes == 1 {
            Ok(t.double_value(&[0, 0]).round() as i64)
        } else {
            Ok(t.argmax(-1, false).int64_value(&[0]))
        }
    }

    fn predict_proba(&self, x: &FeatureVector) -> Result<Vec<f64>, ModelError> {
        if self.n_classes < 2 {
            return Err(ModelError::ProbabilitiesUnsupported);
        }
        let p = self.forward(x)?.softmax(-1, Kind::Double);
        Ok((0..self.n_classes).map(|i| p.double_value(&[0, i])).collect())
    }
}
