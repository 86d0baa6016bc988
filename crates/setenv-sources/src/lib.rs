//! Concrete secret sources: hosted-notebook stores (Colab, Kaggle), dotenv
//! files discovered upward from the working directory, and the OS keyring.

pub mod colab;
pub mod dotenv;
pub mod kaggle;
pub mod keyring_source;

pub use colab::{ColabUserdata, UserdataBackend, UserdataError};
pub use dotenv::{find_dotenv, locate, DotenvFile, DEFAULT_NAMES};
pub use kaggle::{KaggleSecrets, KaggleSettings};
pub use keyring_source::KeyringSource;
