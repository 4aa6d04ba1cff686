use burn::module::Module;
use burn::module::Param;
use burn::module::State;
use burn::optim::decay::WeightDecayConfig;
use burn::optim::momentum::MomentumConfig;
use burn::optim::Optimizer;
use burn::optim::{Sgd, SgdConfig};
use burn::tensor::Data;
use burn::tensor::Shape;
use burn::tensor::Tensor;
use burn::train::TrainOutput;
use burn::train::TrainStep;
use burn_autodiff::ADBackendDecorator;
use burn_ndarray::NdArrayBackend;

use burn::nn;
use burn::tensor::backend::{ADBackend, Backend};

use crate::helpers::config_parser::{BrainConfig, LayerDef, TrainerConfig};

use super::BrainError;

pub type ModelBackend = NdArrayBackend<f32>;
pub type TrainBackend = ADBackendDecorator<ModelBackend>;

/// Regression target for a single output of the network.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RegressionTarget {
    pub action: usize,
    pub value: f32,
}

/// Action-value regressor used by the TD learner.
pub trait ValueNetwork {
    fn input_size(&self) -> usize;
    fn output_size(&self) -> usize;
    /// Must not change the network.
    fn forward(&self, input: &[f32]) -> Vec<f32>;
    /// One training step towards `target`, returns the loss of this sample.
    fn train(&mut self, input: &[f32], target: RegressionTarget) -> f32;
    /// Layer widths, input first, output last.
    fn layers(&self) -> Vec<usize>;
    fn weights(&self) -> Result<serde_json::Value, BrainError>;
    fn load_weights(&mut self, weights: &serde_json::Value) -> Result<(), BrainError>;
}

pub struct TrainModelInput<B: Backend, const D: usize> {
    pub outputs: Tensor<B, D>,
    pub targets: Tensor<B, D>,
    /// 1.0 on the trained output of each row, 0.0 elsewhere.
    pub mask: Tensor<B, D>,
}

#[derive(Module, Debug)]
pub struct Model<B: Backend<FloatElem = f32>> {
    hidden_layers: Param<Vec<nn::Linear<B>>>,
    output_layer: Param<nn::Linear<B>>,
    hidden_activation: nn::ReLU,
}
impl<B: Backend<FloatElem = f32>> Model<B> {
    pub fn new(inputs: usize, outputs: usize, hidden_layers: &[usize]) -> Self {
        let layers = [&[inputs], hidden_layers].concat();
        let mut hidden_layers: Vec<nn::Linear<B>> = Vec::with_capacity(hidden_layers.len() + 1);
        for w in layers.windows(2) {
            let l = nn::Linear::new(&nn::LinearConfig::new(w[0], w[1]).with_bias(true));
            hidden_layers.push(l);
        }
        let output_layer = nn::Linear::new(
            &nn::LinearConfig::new(layers[layers.len() - 1], outputs).with_bias(true),
        );

        Self {
            hidden_layers: Param::from(hidden_layers),
            output_layer: Param::from(output_layer),
            hidden_activation: nn::ReLU::default(),
        }
    }

    pub fn forward(&self, mut xs: Tensor<B, 2>) -> Tensor<B, 2> {
        for layer in self.hidden_layers.iter() {
            xs = layer.forward(xs);
            xs = self.hidden_activation.forward(xs);
        }
        xs = self.output_layer.forward(xs);
        xs
    }

    /// Half the squared error of the masked outputs, summed per row and
    /// averaged over the batch. Each row contributes `(q - y) / rows` to the
    /// gradient of its trained output.
    pub fn loss(
        outputs: Tensor<B, 2>,
        targets: Tensor<B, 2>,
        mask: Tensor<B, 2>,
    ) -> Tensor<B, 1> {
        outputs
            .sub(targets)
            .mul(mask)
            .powf(2.0)
            .sum_dim(1)
            .mean()
            .mul_scalar(0.5)
    }
}
impl<B: ADBackend<FloatElem = f32>> Model<B> {
    pub fn train_step<O: Optimizer<Backend = B>>(
        &self,
        opt: &mut O,
        data: TrainModelInput<B, 2>,
    ) -> Self {
        let out = self.step(data);
        let model = self.clone();
        opt.update_module(model, out.grads)
    }
}
impl<B: ADBackend<FloatElem = f32>> TrainStep<TrainModelInput<B, 2>, Tensor<B, 2>> for Model<B> {
    fn step(&self, item: TrainModelInput<B, 2>) -> TrainOutput<Tensor<B, 2>> {
        let loss = Self::loss(item.outputs.clone(), item.targets, item.mask);
        TrainOutput::new(self, loss.backward(), item.outputs)
    }
}

/**
 * Fully connected ReLU regressor trained with SGD (momentum, L2 decay).
 * Samples passed to `train` are collected and applied as one update every
 * `batch_size` calls.
 */
pub struct BurnValueNetwork {
    model: Model<TrainBackend>,
    opt: Sgd<TrainBackend>,
    layers: Vec<usize>,
    batch_size: usize,
    pending: Vec<(Vec<f32>, RegressionTarget)>,
}
impl BurnValueNetwork {
    pub fn new(inputs: usize, outputs: usize, hidden_layers: &[usize], trainer: &TrainerConfig) -> Self {
        let momentum = if trainer.momentum > 0.0 {
            Some(
                MomentumConfig::new()
                    .with_momentum(trainer.momentum as f64)
                    .with_dampening(0.0),
            )
        } else {
            None
        };
        let batch_size = trainer.batch_size.max(1);
        // Decay is charged once per update, spread over the batch like the loss
        let weight_decay = if trainer.l2_decay > 0.0 {
            Some(WeightDecayConfig::new(
                trainer.l2_decay as f64 / batch_size as f64,
            ))
        } else {
            None
        };
        let sgd = SgdConfig::new(trainer.learning_rate as f64)
            .with_momentum(momentum)
            .with_weight_decay(weight_decay);
        Self {
            model: Model::new(inputs, outputs, hidden_layers),
            opt: Sgd::new(&sgd),
            layers: [&[inputs], hidden_layers, &[outputs]].concat(),
            batch_size,
            pending: Vec::with_capacity(batch_size),
        }
    }

    /// Builds the network described by a validated brain configuration.
    pub fn from_config(
        inputs: usize,
        outputs: usize,
        config: &BrainConfig,
    ) -> Result<Self, BrainError> {
        let hidden = hidden_layers(inputs, outputs, config)?;
        Ok(Self::new(inputs, outputs, &hidden, &config.trainer))
    }

    fn to_tensor(data: Vec<f32>, rows: usize, cols: usize) -> Tensor<TrainBackend, 2> {
        Tensor::from_floats(Data::new(data, Shape::from([rows, cols])))
    }

    fn apply_pending(&mut self) {
        let rows = self.pending.len();
        if rows == 0 {
            return;
        }
        let inputs = self.input_size();
        let outputs_n = self.output_size();
        let mut data = Vec::with_capacity(rows * inputs);
        for (x, _) in &self.pending {
            data.extend_from_slice(x);
        }
        let outputs = self.model.forward(Self::to_tensor(data, rows, inputs));
        let mut target_data = vec![0.0; rows * outputs_n];
        let mut mask_data = vec![0.0; rows * outputs_n];
        for (row, (_, target)) in self.pending.iter().enumerate() {
            target_data[row * outputs_n + target.action] = target.value;
            mask_data[row * outputs_n + target.action] = 1.0;
        }
        let input = TrainModelInput {
            outputs,
            targets: Self::to_tensor(target_data, rows, outputs_n),
            mask: Self::to_tensor(mask_data, rows, outputs_n),
        };
        self.model = self.model.train_step(&mut self.opt, input);
        self.pending.clear();
    }
}
impl ValueNetwork for BurnValueNetwork {
    fn input_size(&self) -> usize {
        self.layers[0]
    }
    fn output_size(&self) -> usize {
        self.layers[self.layers.len() - 1]
    }
    fn forward(&self, input: &[f32]) -> Vec<f32> {
        let xs = Self::to_tensor(input.to_vec(), 1, self.input_size());
        self.model.forward(xs).to_data().value
    }
    fn train(&mut self, input: &[f32], target: RegressionTarget) -> f32 {
        let q = self.forward(input)[target.action];
        let dy = q - target.value;
        self.pending.push((input.to_vec(), target));
        if self.pending.len() >= self.batch_size {
            self.apply_pending();
        }
        0.5 * dy * dy
    }
    fn layers(&self) -> Vec<usize> {
        self.layers.clone()
    }
    fn weights(&self) -> Result<serde_json::Value, BrainError> {
        serde_json::to_value(self.model.state()).map_err(|e| BrainError::Snapshot(e.to_string()))
    }
    fn load_weights(&mut self, weights: &serde_json::Value) -> Result<(), BrainError> {
        let state: State<f32> = serde_json::from_value(weights.clone())
            .map_err(|e| BrainError::Snapshot(e.to_string()))?;
        self.model = self
            .model
            .clone()
            .load(&state)
            .map_err(|e| BrainError::Snapshot(format!("{e:?}")))?;
        self.pending.clear();
        Ok(())
    }
}

/**
 * Hidden layer widths for a network mapping `inputs` to `outputs`.
 *
 * Explicit layer definitions must start with an input layer of width
 * `inputs`, end with a regression layer of `outputs` neurons and hold only
 * fully connected layers in between.
 */
pub fn hidden_layers(
    inputs: usize,
    outputs: usize,
    config: &BrainConfig,
) -> Result<Vec<usize>, BrainError> {
    let hidden = match &config.layer_defs {
        None => config.hidden_layer_sizes.clone(),
        Some(defs) => {
            if defs.len() < 2 {
                return Err(BrainError::Configuration(
                    "layer_defs needs at least an input and a regression layer".to_string(),
                ));
            }
            match defs[0] {
                LayerDef::Input { width } if width == inputs => {}
                LayerDef::Input { width } => {
                    return Err(BrainError::Configuration(format!(
                        "input layer width {width} does not match network input size {inputs}"
                    )))
                }
                _ => {
                    return Err(BrainError::Configuration(
                        "first layer must be an input layer".to_string(),
                    ))
                }
            }
            match defs[defs.len() - 1] {
                LayerDef::Regression { num_neurons } if num_neurons == outputs => {}
                LayerDef::Regression { num_neurons } => {
                    return Err(BrainError::Configuration(format!(
                        "regression layer has {num_neurons} neurons, expected {outputs}"
                    )))
                }
                _ => {
                    return Err(BrainError::Configuration(
                        "last layer must be a regression layer".to_string(),
                    ))
                }
            }
            defs[1..defs.len() - 1]
                .iter()
                .map(|d| match d {
                    LayerDef::Fc { num_neurons } => Ok(*num_neurons),
                    other => Err(BrainError::Configuration(format!(
                        "unexpected hidden layer {other:?}"
                    ))),
                })
                .collect::<Result<Vec<_>, _>>()?
        }
    };
    if hidden.iter().any(|&w| w == 0) {
        return Err(BrainError::Configuration(
            "hidden layers must have at least one neuron".to_string(),
        ));
    }
    Ok(hidden)
}
