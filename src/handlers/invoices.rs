//! Invoice API Handlers
//! POST /api/orders/:id/invoice - 請求書画像のアップロード
//!
//! 画像はダッシュボード側で描画され、ここでは検証・保存・サムネイル生成のみ行う。

use axum::{
    extract::{Multipart, Path, State},
    response::Json,
};
use image::{DynamicImage, ImageFormat};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::io::Cursor;
use std::path::{Path as FsPath, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

use crate::error::AppError;
use crate::models::CommitStatus;
use crate::now_ms;
use crate::orders;
use crate::AppState;

/// DATA_DIR 配下の保存先（/invoices で配信）
pub const INVOICE_DIR: &str = "invoices";

const THUMBNAIL_SIZE: u32 = 320;

#[derive(Serialize)]
pub struct InvoiceUploadResponse {
    pub success: bool,
    pub order_id: String,
    pub invoice_url: String,
    pub thumbnail_url: String,
    pub sha256: String,
    pub width: u32,
    pub height: u32,
}

/// 検証済みの請求書画像
struct InvoiceImage {
    extension: &'static str,
    width: u32,
    height: u32,
    thumbnail_png: Vec<u8>,
}

/// POST /api/orders/:id/invoice
///
/// Parameters (multipart/form-data):
///   - file: PNG または JPEG（必須）
///
/// 失敗しても注文は変更しない。
pub async fn upload_invoice(
    State(state): State<Arc<AppState>>,
    Path(order_id): Path<String>,
    mut multipart: Multipart,
) -> Result<Json<InvoiceUploadResponse>, AppError> {
    let order = orders::find_order(&state.db, &order_id).await?;
    if order.commit_status()? != CommitStatus::Completed {
        return Err(AppError::Conflict(format!(
            "order {} is not fully committed; invoice upload is not allowed",
            order.order_number
        )));
    }

    // multipart フィールドを解析
    let mut file_data: Option<Vec<u8>> = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("Multipart error: {}", e)))?
    {
        let name = field.name().unwrap_or("").to_string();
        if name == "file" {
            let bytes = field
                .bytes()
                .await
                .map_err(|e| AppError::Validation(format!("File read error: {}", e)))?;
            info!("📄 Invoice file received: {} bytes", bytes.len());
            file_data = Some(bytes.to_vec());
        } else {
            warn!("⚠️  Unknown field: {}", name);
        }
    }
    let file_data = file_data.ok_or_else(|| AppError::Validation("No file uploaded".to_string()))?;

    // デコードは CPU 負荷が高いのでブロッキングスレッドで
    let bytes = file_data.clone();
    let invoice = tokio::task::spawn_blocking(move || inspect_invoice(&bytes))
        .await
        .map_err(|e| AppError::Invoice(format!("image task failed: {}", e)))??;

    let sha256 = compute_sha256(&file_data);
    let dir = state.config.data_dir.join(INVOICE_DIR);
    let filename = format!("{}.{}", order.id, invoice.extension);
    let thumbnail_name = format!("{}_thumb.png", order.id);

    save_files(&dir, &filename, &file_data, &thumbnail_name, &invoice.thumbnail_png)
        .await
        .map_err(|e| AppError::Invoice(format!("Failed to store invoice: {}", e)))?;

    let invoice_url = format!("{}/{}/{}", state.config.public_base_url, INVOICE_DIR, filename);
    let thumbnail_url = format!("{}/{}/{}", state.config.public_base_url, INVOICE_DIR, thumbnail_name);

    sqlx::query("UPDATE orders SET invoice_url = ?, invoice_sha256 = ?, updated_at = ? WHERE id = ?")
        .bind(&invoice_url)
        .bind(&sha256)
        .bind(now_ms())
        .bind(&order.id)
        .execute(&state.db)
        .await?;

    info!("✅ Invoice saved: {} (sha256: {})", invoice_url, &sha256[..16]);

    Ok(Json(InvoiceUploadResponse {
        success: true,
        order_id: order.id,
        invoice_url,
        thumbnail_url,
        sha256,
        width: invoice.width,
        height: invoice.height,
    }))
}

// ========================================
// Helper Functions
// ========================================

/// PNG / JPEG のみ受け付け、実際にデコードできるか確かめる
fn inspect_invoice(data: &[u8]) -> Result<InvoiceImage, AppError> {
    let format = image::guess_format(data)
        .map_err(|_| AppError::Invoice("unrecognised image format".to_string()))?;
    let extension = match format {
        ImageFormat::Png => "png",
        ImageFormat::Jpeg => "jpg",
        other => {
            return Err(AppError::Invoice(format!(
                "unsupported image format {:?}; expected PNG or JPEG",
                other
            )))
        }
    };

    let decoded = image::load_from_memory_with_format(data, format)
        .map_err(|e| AppError::Invoice(format!("image could not be decoded: {}", e)))?;

    Ok(InvoiceImage {
        extension,
        width: decoded.width(),
        height: decoded.height(),
        thumbnail_png: render_thumbnail(&decoded)?,
    })
}

fn render_thumbnail(image: &DynamicImage) -> Result<Vec<u8>, AppError> {
    let thumbnail = image.thumbnail(THUMBNAIL_SIZE, THUMBNAIL_SIZE);
    let mut buf = Cursor::new(Vec::new());
    thumbnail
        .write_to(&mut buf, ImageFormat::Png)
        .map_err(|e| AppError::Invoice(format!("thumbnail encoding failed: {}", e)))?;
    Ok(buf.into_inner())
}

async fn save_files(
    dir: &FsPath,
    filename: &str,
    data: &[u8],
    thumbnail_name: &str,
    thumbnail: &[u8],
) -> anyhow::Result<()> {
    fs::create_dir_all(dir).await?;
    write_file(dir.join(filename), data).await?;
    write_file(dir.join(thumbnail_name), thumbnail).await?;
    Ok(())
}

async fn write_file(path: PathBuf, data: &[u8]) -> anyhow::Result<()> {
    let mut file = fs::File::create(&path).await?;
    file.write_all(data).await?;
    file.flush().await?;
    info!("File saved: {:?}", path);
    Ok(())
}

fn compute_sha256(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgb};

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = ImageBuffer::from_pixel(width, height, Rgb([255u8, 255, 255]));
        let mut buf = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(img).write_to(&mut buf, ImageFormat::Png).unwrap();
        buf.into_inner()
    }

    #[test]
    fn accepts_png_and_builds_thumbnail() {
        let invoice = inspect_invoice(&png_bytes(800, 400)).unwrap();
        assert_eq!(invoice.extension, "png");
        assert_eq!((invoice.width, invoice.height), (800, 400));

        let thumb = image::load_from_memory(&invoice.thumbnail_png).unwrap();
        assert_eq!(thumb.width(), THUMBNAIL_SIZE);
        assert!(thumb.height() <= THUMBNAIL_SIZE);
    }

    #[test]
    fn rejects_non_images() {
        assert!(matches!(inspect_invoice(b"not an image"), Err(AppError::Invoice(_))));
    }

    #[test]
    fn rejects_truncated_png() {
        let mut bytes = png_bytes(64, 64);
        bytes.truncate(40);
        assert!(matches!(inspect_invoice(&bytes), Err(AppError::Invoice(_))));
    }
}
