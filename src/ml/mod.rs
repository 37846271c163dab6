pub mod backend;
pub mod preprocess;
pub mod ml_model;
pub mod training;
pub mod inference;

pub use ml_model::{ModelConfig, PlantDiseaseCnn, IMAGE_SIZE};
pub use preprocess::{preprocess_bytes, preprocess_image, preprocess_path, PreprocessError};
pub use training::{run_training, train_model, EpochMetrics, LeafDataset, TrainingReport};
pub use inference::{ClassifyError, Diagnosis, InferenceEngine, Prediction};
