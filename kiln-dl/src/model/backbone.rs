use crate::common::*;
use tch::{CModule, IValue};

/// Capability interface over the frozen vision-language model.
///
/// Both encoders are frozen: implementations expose no trainable state, so
/// the optimizer never sees backbone parameters. Gradients still flow
/// through `encode_image` into whatever produced the input batch.
pub trait VisionLanguageBackbone
where
    Self: Debug + Send + Sync,
{
    /// Embedding dimensionality shared by the two encoders.
    fn embed_dim(&self) -> i64;

    /// Native input resolution of the image encoder.
    fn input_resolution(&self) -> i64;

    /// Tokenize one prompt to a `[1, context]` int64 tensor.
    fn tokenize(&self, text: &str) -> Result<Tensor>;

    /// Encode `[N, context]` token batches to `[N, embed_dim]` embeddings.
    fn encode_text(&self, tokens: &Tensor) -> Result<Tensor>;

    /// Encode `[B, 3, R, R]` image batches to `[B, embed_dim]` embeddings.
    fn encode_image(&self, images: &Tensor) -> Result<Tensor>;
}

pub const CLIP_EMBED_DIM: i64 = 512;
pub const CLIP_INPUT_RESOLUTION: i64 = 224;

/// ViT-B/32 CLIP consumed as a TorchScript export carrying `encode_image`,
/// `encode_text` and `tokenize` methods.
pub struct ScriptedClip {
    // TorchScript modules are not thread-safe for concurrent calls
    module: Mutex<CModule>,
    file: PathBuf,
}

impl ScriptedClip {
    pub fn load(file: impl AsRef<Path>, device: Device) -> Result<Self> {
        let file = file.as_ref();
        let mut module = CModule::load_on_device(file, device)
            .with_context(|| format!("failed to load backbone '{}'", file.display()))?;
        module.set_eval();
        Ok(Self {
            module: Mutex::new(module),
            file: file.to_owned(),
        })
    }

    fn with_module<T>(&self, f: impl FnOnce(&CModule) -> Result<T>) -> Result<T> {
        let module = self
            .module
            .lock()
            .map_err(|_| format_err!("backbone lock poisoned"))?;
        f(&module)
    }
}

impl Debug for ScriptedClip {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptedClip")
            .field("file", &self.file)
            .finish()
    }
}

impl VisionLanguageBackbone for ScriptedClip {
    fn embed_dim(&self) -> i64 {
        CLIP_EMBED_DIM
    }

    fn input_resolution(&self) -> i64 {
        CLIP_INPUT_RESOLUTION
    }

    fn tokenize(&self, text: &str) -> Result<Tensor> {
        self.with_module(|module| {
            let output = module.method_is("tokenize", &[IValue::String(text.to_owned())])?;
            match output {
                IValue::Tensor(tokens) => Ok(tokens),
                other => bail!("tokenize returned {:?}, expected a tensor", other),
            }
        })
    }

    fn encode_text(&self, tokens: &Tensor) -> Result<Tensor> {
        self.with_module(|module| {
            Ok(module.method_ts("encode_text", &[tokens.shallow_clone()])?)
        })
    }

    fn encode_image(&self, images: &Tensor) -> Result<Tensor> {
        self.with_module(|module| {
            Ok(module.method_ts("encode_image", &[images.shallow_clone()])?)
        })
    }
}
