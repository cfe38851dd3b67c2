//! Graph attention classifier
//!
//! Inference-only rendition of the contact classifier: a two-layer GATv2
//! encoder with one residual projection, a readout over the nodes of the
//! central frame, and a three-layer classification head. Parameter names
//! follow the checkpoint layout (`encoder.gatenc1.lin_l.weight`, ...).
//!
//! Dropout is a training-time concern and never applied here.

use crate::config::ComputeDevice;
use crate::registry::{EncoderParams, HeadParams, Readout};
use crate::types::GraphSample;
use ndarray::{Array1, Array2, Array3, ArrayViewMutD, Axis};

/// Negative slope of the attention LeakyReLU
const ATTENTION_NEGATIVE_SLOPE: f32 = 0.2;

/// Mutable views of every parameter, keyed by checkpoint name
pub type ParamViews<'a> = Vec<(String, ArrayViewMutD<'a, f32>)>;

/// Dense affine layer, `y = x W^T + b`
#[derive(Debug, Clone)]
pub struct Linear {
    weight: Array2<f32>,
    bias: Array1<f32>,
}

impl Linear {
    pub fn new(n_in: usize, n_out: usize) -> Self {
        Self {
            weight: Array2::zeros((n_out, n_in)),
            bias: Array1::zeros(n_out),
        }
    }

    pub fn forward(&self, x: &Array2<f32>) -> Array2<f32> {
        let mut y = x.dot(&self.weight.t());
        y += &self.bias;
        y
    }

    pub fn forward_vec(&self, x: &Array1<f32>) -> Array1<f32> {
        self.weight.dot(x) + &self.bias
    }

    pub fn in_features(&self) -> usize {
        self.weight.ncols()
    }

    fn params_mut<'a>(&'a mut self, prefix: &str, out: &mut ParamViews<'a>) {
        out.push((format!("{prefix}.weight"), self.weight.view_mut().into_dyn()));
        out.push((format!("{prefix}.bias"), self.bias.view_mut().into_dyn()));
    }
}

/// GATv2 convolution with self loops
#[derive(Debug, Clone)]
pub struct GatV2Conv {
    lin_l: Linear,
    lin_r: Linear,
    /// Attention vector, shape `[1, heads, out_channels]`
    att: Array3<f32>,
    bias: Array1<f32>,
    heads: usize,
    out_channels: usize,
    concat: bool,
}

impl GatV2Conv {
    pub fn new(n_in: usize, out_channels: usize, heads: usize, concat: bool) -> Self {
        let bias_len = if concat { heads * out_channels } else { out_channels };
        Self {
            lin_l: Linear::new(n_in, heads * out_channels),
            lin_r: Linear::new(n_in, heads * out_channels),
            att: Array3::zeros((1, heads, out_channels)),
            bias: Array1::zeros(bias_len),
            heads,
            out_channels,
            concat,
        }
    }

    pub fn forward(&self, x: &Array2<f32>, edge_index: &[[usize; 2]]) -> Result<Array2<f32>, String> {
        let n = x.nrows();
        if x.ncols() != self.lin_l.in_features() {
            return Err(format!(
                "expected {} node features, got {}",
                self.lin_l.in_features(),
                x.ncols()
            ));
        }

        let x_l = self.lin_l.forward(x);
        let x_r = self.lin_r.forward(x);
        let edges = with_self_loops(edge_index, n)?;

        let (h_count, c_count) = (self.heads, self.out_channels);

        // Attention logits per (edge, head)
        let mut scores = Array2::<f32>::zeros((edges.len(), h_count));
        for (e, &(src, dst)) in edges.iter().enumerate() {
            for h in 0..h_count {
                let mut score = 0.0;
                for c in 0..c_count {
                    let col = h * c_count + c;
                    let v = leaky_relu(x_l[[src, col]] + x_r[[dst, col]], ATTENTION_NEGATIVE_SLOPE);
                    score += self.att[[0, h, c]] * v;
                }
                scores[[e, h]] = score;
            }
        }

        // Softmax over the incoming edges of every target node
        let mut max_score = Array2::<f32>::from_elem((n, h_count), f32::NEG_INFINITY);
        for (e, &(_, dst)) in edges.iter().enumerate() {
            for h in 0..h_count {
                max_score[[dst, h]] = max_score[[dst, h]].max(scores[[e, h]]);
            }
        }
        let mut denom = Array2::<f32>::zeros((n, h_count));
        for (e, &(_, dst)) in edges.iter().enumerate() {
            for h in 0..h_count {
                let w = (scores[[e, h]] - max_score[[dst, h]]).exp();
                scores[[e, h]] = w;
                denom[[dst, h]] += w;
            }
        }

        let mut messages = Array3::<f32>::zeros((n, h_count, c_count));
        for (e, &(src, dst)) in edges.iter().enumerate() {
            for h in 0..h_count {
                let alpha = scores[[e, h]] / denom[[dst, h]];
                for c in 0..c_count {
                    messages[[dst, h, c]] += alpha * x_l[[src, h * c_count + c]];
                }
            }
        }

        let mut out = if self.concat {
            messages
                .into_shape((n, h_count * c_count))
                .map_err(|e| e.to_string())?
        } else {
            messages
                .mean_axis(Axis(1))
                .ok_or_else(|| "attention layer has no heads".to_string())?
        };
        out += &self.bias;
        Ok(out)
    }

    fn params_mut<'a>(&'a mut self, prefix: &str, out: &mut ParamViews<'a>) {
        out.push((format!("{prefix}.att"), self.att.view_mut().into_dyn()));
        out.push((format!("{prefix}.bias"), self.bias.view_mut().into_dyn()));
        self.lin_l.params_mut(&format!("{prefix}.lin_l"), out);
        self.lin_r.params_mut(&format!("{prefix}.lin_r"), out);
    }
}

/// Drop existing self loops and add exactly one per node
fn with_self_loops(edge_index: &[[usize; 2]], n: usize) -> Result<Vec<(usize, usize)>, String> {
    let mut edges = Vec::with_capacity(edge_index.len() + n);
    for &[src, dst] in edge_index {
        if src >= n || dst >= n {
            return Err(format!("edge ({src}, {dst}) out of range for {n} nodes"));
        }
        if src != dst {
            edges.push((src, dst));
        }
    }
    edges.extend((0..n).map(|i| (i, i)));
    Ok(edges)
}

fn leaky_relu(v: f32, slope: f32) -> f32 {
    if v >= 0.0 {
        v
    } else {
        slope * v
    }
}

fn relu(mut x: Array2<f32>) -> Array2<f32> {
    x.mapv_inplace(|v| v.max(0.0));
    x
}

fn relu_vec(mut x: Array1<f32>) -> Array1<f32> {
    x.mapv_inplace(|v| v.max(0.0));
    x
}

/// Two GATv2 layers with a residual projection between them
#[derive(Debug, Clone)]
pub struct GatEncoder {
    gatenc1: GatV2Conv,
    gatenc2: GatV2Conv,
    res_conn: Linear,
}

impl GatEncoder {
    pub fn new(params: &EncoderParams) -> Self {
        let hidden = params.n_hidden * params.heads;
        Self {
            gatenc1: GatV2Conv::new(params.n_in, params.n_hidden, params.heads, true),
            gatenc2: GatV2Conv::new(hidden, params.n_out, params.heads, false),
            res_conn: Linear::new(hidden, hidden),
        }
    }

    /// Node embeddings, shape `[nodes, n_out]`
    pub fn forward(&self, x: &Array2<f32>, edge_index: &[[usize; 2]]) -> Result<Array2<f32>, String> {
        let h = self.gatenc1.forward(x, edge_index)?;
        let h1 = relu(h.clone());
        // the projection sees the pre-activation output
        let h = self.res_conn.forward(&h) + &h1;
        let h2 = relu(h);
        let h = self.gatenc2.forward(&h2, edge_index)?;
        Ok(relu(h))
    }

    fn params_mut<'a>(&'a mut self, prefix: &str, out: &mut ParamViews<'a>) {
        self.gatenc1.params_mut(&format!("{prefix}.gatenc1"), out);
        self.gatenc2.params_mut(&format!("{prefix}.gatenc2"), out);
        self.res_conn.params_mut(&format!("{prefix}.res_conn.0"), out);
    }
}

/// Three-layer perceptron over the pooled embedding
#[derive(Debug, Clone)]
pub struct ClassificationHead {
    hidden1: Linear,
    hidden2: Linear,
    hidden3: Linear,
}

impl ClassificationHead {
    pub fn new(params: &HeadParams) -> Self {
        Self {
            hidden1: Linear::new(params.n_latent, params.n_hidden),
            hidden2: Linear::new(params.n_hidden, params.n_hidden),
            hidden3: Linear::new(params.n_hidden, params.n_out),
        }
    }

    pub fn forward(&self, z: &Array1<f32>) -> Result<Array1<f32>, String> {
        if z.len() != self.hidden1.in_features() {
            return Err(format!(
                "classification head expects {} inputs, readout produced {}",
                self.hidden1.in_features(),
                z.len()
            ));
        }
        let h = relu_vec(self.hidden1.forward_vec(z));
        let h = relu_vec(self.hidden2.forward_vec(&h));
        Ok(self.hidden3.forward_vec(&h))
    }

    fn params_mut<'a>(&'a mut self, prefix: &str, out: &mut ParamViews<'a>) {
        self.hidden1.params_mut(&format!("{prefix}.hidden1"), out);
        self.hidden2.params_mut(&format!("{prefix}.hidden2"), out);
        self.hidden3.params_mut(&format!("{prefix}.hidden3"), out);
    }
}

/// Per-frame prediction from one graph sample
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GraphPrediction {
    pub frame: i64,
    pub label: i64,
    pub probabilities: [f32; 2],
}

/// Encoder, readout and head
#[derive(Debug, Clone)]
pub struct GraphClassifier {
    encoder: GatEncoder,
    classifier: ClassificationHead,
    readout: Readout,
    device: ComputeDevice,
}

impl GraphClassifier {
    /// Build the architecture with zero-initialised parameters; weights are
    /// restored from a checkpoint afterwards
    pub fn new(encoder: &EncoderParams, head: &HeadParams, readout: Readout) -> Self {
        Self {
            encoder: GatEncoder::new(encoder),
            classifier: ClassificationHead::new(head),
            readout,
            device: ComputeDevice::Cpu,
        }
    }

    /// Place the model on a device
    pub fn to_device(mut self, device: ComputeDevice) -> Self {
        self.device = device.effective();
        self
    }

    pub fn device(&self) -> ComputeDevice {
        self.device
    }

    pub fn readout(&self) -> Readout {
        self.readout
    }

    /// Every parameter with its checkpoint name
    pub fn params_mut(&mut self) -> ParamViews<'_> {
        let mut out = Vec::new();
        self.encoder.params_mut("encoder", &mut out);
        self.classifier.params_mut("classifier", &mut out);
        out
    }

    /// Raw two-class logits for one sample
    pub fn forward(&self, sample: &GraphSample) -> Result<Array1<f32>, String> {
        let central = sample.central_nodes();
        if central.is_empty() {
            return Err("graph sample has no nodes".to_string());
        }
        if sample.frame_mask.len() != sample.num_nodes() {
            return Err(format!(
                "frame mask covers {} nodes, sample has {}",
                sample.frame_mask.len(),
                sample.num_nodes()
            ));
        }

        let x = node_matrix(sample)?;
        let embeddings = self.encoder.forward(&x, &sample.edge_index)?;
        let central_rows = embeddings.select(Axis(0), &central);

        let pooled = match self.readout {
            Readout::Mean => central_rows
                .mean_axis(Axis(0))
                .ok_or_else(|| "empty readout".to_string())?,
            Readout::Max => central_rows.fold_axis(Axis(0), f32::NEG_INFINITY, |acc, v| acc.max(*v)),
            Readout::Concatenate => Array1::from_iter(central_rows.iter().copied()),
        };

        self.classifier.forward(&pooled)
    }

    /// Predict the central frame's label: arg-max of the two-way softmax
    pub fn predict(&self, sample: &GraphSample) -> Result<GraphPrediction, String> {
        let frame = sample
            .frame_index()
            .ok_or_else(|| "graph sample has no frame mask".to_string())?;
        let logits = self.forward(sample)?;
        if logits.len() != 2 {
            return Err(format!("expected 2 output classes, got {}", logits.len()));
        }
        let probabilities = softmax2([logits[0], logits[1]]);
        Ok(GraphPrediction {
            frame,
            label: argmax(&probabilities) as i64,
            probabilities,
        })
    }

    /// Predict a batch; output order equals input order
    pub fn predict_batch(&self, samples: &[GraphSample]) -> Result<Vec<GraphPrediction>, String> {
        samples.iter().map(|s| self.predict(s)).collect()
    }
}

fn node_matrix(sample: &GraphSample) -> Result<Array2<f32>, String> {
    let width = sample.feature_width();
    if sample.x.iter().any(|row| row.len() != width) {
        return Err("node feature rows have different widths".to_string());
    }
    let flat: Vec<f32> = sample.x.iter().flatten().copied().collect();
    Array2::from_shape_vec((sample.num_nodes(), width), flat).map_err(|e| e.to_string())
}

/// Numerically stable softmax over two logits
pub fn softmax2(logits: [f32; 2]) -> [f32; 2] {
    let max = logits[0].max(logits[1]);
    let e0 = (logits[0] - max).exp();
    let e1 = (logits[1] - max).exp();
    let sum = e0 + e1;
    [e0 / sum, e1 / sum]
}

/// Index of the first maximum; ties go to the lower index and an empty
/// slice gives 0
pub fn argmax<T: PartialOrd>(values: &[T]) -> usize {
    let mut best = 0;
    for (i, v) in values.iter().enumerate() {
        if *v > values[best] {
            best = i;
        }
    }
    best
}
