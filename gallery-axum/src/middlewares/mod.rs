pub mod multipart;

pub use multipart::{decode_encoded_word, FormFile, MultipartConfig, UploadForm};
