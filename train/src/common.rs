//! Common imports from external crates.

pub use anyhow::{bail, ensure, format_err, Context, Error, Result};
pub use chrono::Local;
pub use futures::{
    future::FutureExt,
    stream::{self, Stream, StreamExt, TryStreamExt},
};
pub use itertools::Itertools;
pub use kiln_dl::{
    balance::ClassWeights,
    dataset::{
        BandStatsTable, ExampleRecord, Manifest, NormalizedTileDataset, Split, CLASS_NAMES,
        NUM_BANDS, SENTINEL2_BANDS,
    },
    model::{
        accuracy, ChannelAdapter, ScriptedClip, VisionLanguageBackbone, WeightedCrossEntropy,
        ZeroShotHead,
    },
};
pub use noisy_float::prelude::*;
pub use par_stream::{ParStreamExt, TryParStreamExt};
pub use rand::{prelude::*, rngs::StdRng};
pub use serde::{Deserialize, Serialize};
pub use std::{
    env,
    fmt::{self, Debug},
    fs,
    num::NonZeroUsize,
    path::{Path, PathBuf},
    pin::Pin,
    sync::Arc,
};
pub use structopt::StructOpt;
pub use tch::{
    nn::{self, OptimizerConfig as _},
    Device, Kind, Tensor,
};
pub use tfrecord::{EventWriter, EventWriterInit};
pub use tokio::sync::mpsc;
pub use tracing::{info, warn};

pub type Fallible<T> = Result<T, Error>;
