use axum::extract::Multipart;
use utoipa::ToSchema;

use crate::app_error::{AppError, FieldErrors};

/// A single file pulled out of a multipart body.
pub struct UploadedFile {
    pub filename: String,
    pub bytes: Vec<u8>,
}

/// Reads the multipart body until `field` is found. Other fields are skipped.
pub async fn read_file_field(
    multipart: &mut Multipart,
    field: &str,
) -> Result<UploadedFile, AppError> {
    while let Some(part) = multipart
        .next_field()
        .await
        .map_err(|err| AppError::BadRequest(format!("Malformed multipart body: {err}")))?
    {
        if part.name() != Some(field) {
            continue;
        }

        let filename = part.file_name().unwrap_or(field).to_string();
        let bytes = part
            .bytes()
            .await
            .map_err(|err| AppError::BadRequest(format!("Failed to read upload: {err}")))?;

        if bytes.is_empty() {
            break;
        }

        return Ok(UploadedFile {
            filename,
            bytes: bytes.to_vec(),
        });
    }

    Err(AppError::Validation(FieldErrors::single(
        field,
        "No file was submitted.",
    )))
}

/// Multipart body of `upload_image`.
#[derive(ToSchema)]
pub struct ProductImageUpload {
    #[schema(value_type = String, format = Binary)]
    pub image: Vec<u8>,
}

/// Multipart body of `upload_picture`.
#[derive(ToSchema)]
pub struct ProfilePictureUpload {
    #[schema(value_type = String, format = Binary)]
    pub profile_picture: Vec<u8>,
}

/// Multipart body of `upload_logo`.
#[derive(ToSchema)]
pub struct StoreLogoUpload {
    #[schema(value_type = String, format = Binary)]
    pub store_logo: Vec<u8>,
}

/// Multipart body of `upload_banner`.
#[derive(ToSchema)]
pub struct StoreBannerUpload {
    #[schema(value_type = String, format = Binary)]
    pub store_banner: Vec<u8>,
}
