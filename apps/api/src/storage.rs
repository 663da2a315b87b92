//! Object storage for the original CV files.

use aws_sdk_s3::primitives::ByteStream;
use bytes::Bytes;
use tracing::{info, warn};
use uuid::Uuid;

use crate::errors::AppError;

pub fn cv_key(user_id: Uuid, analysis_id: Uuid, position: usize) -> String {
    format!("cvs/{user_id}/{analysis_id}/{position}.pdf")
}

/// Uploads one CV as `application/pdf`.
pub async fn store_cv(
    s3: &aws_sdk_s3::Client,
    bucket: &str,
    key: &str,
    bytes: Bytes,
) -> Result<(), AppError> {
    s3.put_object()
        .bucket(bucket)
        .key(key)
        .content_type("application/pdf")
        .body(ByteStream::from(bytes))
        .send()
        .await
        .map_err(|e| AppError::S3(format!("Failed to upload {key}: {e}")))?;

    Ok(())
}

/// Uploads every CV of an analysis. Storage is best effort: a failed upload is
/// logged and its slot is `None`, the analysis carries on without the original.
pub async fn store_cvs(
    s3: &aws_sdk_s3::Client,
    bucket: &str,
    user_id: Uuid,
    analysis_id: Uuid,
    files: &[Bytes],
) -> Vec<Option<String>> {
    let mut keys = Vec::with_capacity(files.len());
    for (position, bytes) in files.iter().enumerate() {
        let key = cv_key(user_id, analysis_id, position);
        match store_cv(s3, bucket, &key, bytes.clone()).await {
            Ok(()) => keys.push(Some(key)),
            Err(e) => {
                warn!("{e}");
                keys.push(None);
            }
        }
    }

    info!(
        "Stored {}/{} CVs for analysis {analysis_id} in s3://{bucket}",
        keys.iter().filter(|k| k.is_some()).count(),
        files.len()
    );
    keys
}
