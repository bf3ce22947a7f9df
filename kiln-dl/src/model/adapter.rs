use crate::common::*;

/// Per-pixel linear projection from the spectral bands to the three
/// channels the frozen backbone expects. All kernels are 1x1, so the
/// spatial dimensions pass through unchanged and only the channel mixing is
/// learned.
#[derive(Debug, Clone)]
pub struct LinearAdapterInit {
    pub in_c: usize,
    pub out_c: usize,
}

impl LinearAdapterInit {
    pub fn new(in_c: usize) -> Self {
        Self { in_c, out_c: 3 }
    }

    pub fn build<'p, P>(self, path: P) -> LinearAdapter
    where
        P: Borrow<nn::Path<'p>>,
    {
        let path = path.borrow();
        let Self { in_c, out_c } = self;

        let proj = nn::conv2d(
            path / "proj",
            in_c as i64,
            out_c as i64,
            1,
            Default::default(),
        );

        LinearAdapter { proj }
    }
}

#[derive(Debug)]
pub struct LinearAdapter {
    proj: nn::Conv2D,
}

impl nn::Module for LinearAdapter {
    fn forward(&self, xs: &Tensor) -> Tensor {
        xs.apply(&self.proj)
    }
}

/// Per-pixel two-stage projection with rectification after each stage.
///
/// The final ReLU clips negative outputs, so the backbone only ever sees
/// the non-negative quadrant; kept as in the reference model.
#[derive(Debug, Clone)]
pub struct MlpAdapterInit {
    pub in_c: usize,
    pub hidden_c: usize,
    pub out_c: usize,
}

impl MlpAdapterInit {
    pub fn new(in_c: usize) -> Self {
        Self {
            in_c,
            hidden_c: 64,
            out_c: 3,
        }
    }

    pub fn build<'p, P>(self, path: P) -> MlpAdapter
    where
        P: Borrow<nn::Path<'p>>,
    {
        let path = path.borrow();
        let Self {
            in_c,
            hidden_c,
            out_c,
        } = self;

        let proj1 = nn::conv2d(
            path / "proj1",
            in_c as i64,
            hidden_c as i64,
            1,
            Default::default(),
        );
        let proj2 = nn::conv2d(
            path / "proj2",
            hidden_c as i64,
            out_c as i64,
            1,
            Default::default(),
        );

        MlpAdapter { proj1, proj2 }
    }
}

#[derive(Debug)]
pub struct MlpAdapter {
    proj1: nn::Conv2D,
    proj2: nn::Conv2D,
}

impl nn::Module for MlpAdapter {
    fn forward(&self, xs: &Tensor) -> Tensor {
        xs.apply(&self.proj1).relu().apply(&self.proj2).relu()
    }
}

/// The adapter variants behind one capability. Selected by configuration;
/// trained and evaluated identically.
#[derive(Debug)]
pub enum ChannelAdapter {
    Linear(LinearAdapter),
    Mlp(MlpAdapter),
}

impl ChannelAdapter {
    pub fn linear<'p, P>(path: P, in_c: usize) -> Self
    where
        P: Borrow<nn::Path<'p>>,
    {
        Self::Linear(LinearAdapterInit::new(in_c).build(path))
    }

    pub fn mlp<'p, P>(path: P, in_c: usize, hidden_c: usize) -> Self
    where
        P: Borrow<nn::Path<'p>>,
    {
        Self::Mlp(
            MlpAdapterInit {
                hidden_c,
                ..MlpAdapterInit::new(in_c)
            }
            .build(path),
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Linear(_) => "linear",
            Self::Mlp(_) => "mlp",
        }
    }

    pub fn forward(&self, xs: &Tensor) -> Tensor {
        match self {
            Self::Linear(adapter) => adapter.forward(xs),
            Self::Mlp(adapter) => adapter.forward(xs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linear_adapter_preserves_spatial_dims() {
        let vs = nn::VarStore::new(Device::Cpu);
        let adapter = ChannelAdapter::linear(vs.root(), 13);

        let input = Tensor::randn(&[2, 13, 64, 64], (Kind::Float, Device::Cpu));
        let output = adapter.forward(&input);
        assert_eq!(output.size(), &[2, 3, 64, 64]);
        assert_eq!(adapter.name(), "linear");
    }

    #[test]
    fn mlp_adapter_preserves_spatial_dims() {
        let vs = nn::VarStore::new(Device::Cpu);
        let adapter = ChannelAdapter::mlp(vs.root(), 13, 64);

        let input = Tensor::randn(&[4, 13, 64, 64], (Kind::Float, Device::Cpu));
        let output = adapter.forward(&input);
        assert_eq!(output.size(), &[4, 3, 64, 64]);
        assert_eq!(adapter.name(), "mlp");
    }

    #[test]
    fn mlp_output_is_rectified() {
        let vs = nn::VarStore::new(Device::Cpu);
        let adapter = ChannelAdapter::mlp(vs.root(), 13, 16);

        let input = Tensor::randn(&[1, 13, 8, 8], (Kind::Float, Device::Cpu));
        let output = adapter.forward(&input);
        assert!(bool::from(output.ge(0.0).all()));
    }
}
