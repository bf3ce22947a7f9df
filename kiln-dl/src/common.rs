//! Common imports from external crates.

pub use anyhow::{bail, ensure, format_err, Context, Error, Result};
pub use itertools::{izip, Itertools};
pub use ndarray::Array2;
pub use serde::{Deserialize, Serialize};
pub use std::{
    borrow::Borrow,
    collections::HashMap,
    fmt::{self, Debug},
    fs::File,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};
pub use tch::{
    nn::{self, Module as _},
    Device, Kind, Tensor,
};
pub use tracing::{info, warn};
