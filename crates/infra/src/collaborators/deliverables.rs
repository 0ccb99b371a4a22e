//! Patron deliverables (PDF or ZIP of a unit's images).

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::info;
use zip::CompressionMethod;
use zip::write::{SimpleFileOptions, ZipWriter};

use digiserv_core::{OrderId, UnitId};
use digiserv_units::DeliverableFormat;

use super::CollaboratorError;
use super::command;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliverableRequest {
    pub unit_id: UnitId,
    pub order_id: OrderId,
    pub format: DeliverableFormat,
    /// Page images in order.
    pub images: Vec<PathBuf>,
    /// Scratch directory owned by the calling job.
    pub work_dir: PathBuf,
}

impl DeliverableRequest {
    pub fn file_name(&self) -> String {
        format!("{:09}.{}", self.unit_id.get(), self.format.as_str())
    }
}

#[async_trait]
pub trait DeliverableBuilder: Send + Sync {
    /// Build the deliverable and return where it was delivered.
    async fn build(&self, request: &DeliverableRequest) -> Result<PathBuf, CollaboratorError>;
}

/// Writes deliverables to `<delivery_root>/order_<order id>/`.
#[derive(Debug, Clone)]
pub struct FsDeliverableBuilder {
    delivery_root: PathBuf,
    image_tool: String,
}

impl FsDeliverableBuilder {
    pub fn new(delivery_root: impl Into<PathBuf>, image_tool: impl Into<String>) -> Self {
        Self {
            delivery_root: delivery_root.into(),
            image_tool: image_tool.into(),
        }
    }

    pub fn order_dir(&self, order: OrderId) -> PathBuf {
        self.delivery_root.join(format!("order_{order}"))
    }
}

#[async_trait]
impl DeliverableBuilder for FsDeliverableBuilder {
    async fn build(&self, request: &DeliverableRequest) -> Result<PathBuf, CollaboratorError> {
        if request.images.is_empty() {
            return Err(CollaboratorError::invalid(
                "build deliverable",
                format!("unit {}", request.unit_id),
                "no images",
            ));
        }
        tokio::fs::create_dir_all(&request.work_dir)
            .await
            .map_err(|e| CollaboratorError::io("build deliverable", &request.work_dir, e))?;

        let scratch = request.work_dir.join(request.file_name());
        match request.format {
            DeliverableFormat::Zip => {
                let images = request.images.clone();
                let out = scratch.clone();
                tokio::task::spawn_blocking(move || write_zip(&out, &images))
                    .await
                    .map_err(|e| CollaboratorError::invalid("build zip", scratch.display().to_string(), e.to_string()))?
                    .map_err(|e| CollaboratorError::io("build zip", &scratch, e))?;
            }
            DeliverableFormat::Pdf => {
                let mut args: Vec<&std::ffi::OsStr> =
                    request.images.iter().map(|p| p.as_os_str()).collect();
                args.push(scratch.as_os_str());
                command::run("build pdf", &self.image_tool, args).await?;
            }
        }

        let order_dir = self.order_dir(request.order_id);
        tokio::fs::create_dir_all(&order_dir)
            .await
            .map_err(|e| CollaboratorError::io("deliver", &order_dir, e))?;
        let dest = order_dir.join(request.file_name());
        tokio::fs::copy(&scratch, &dest)
            .await
            .map_err(|e| CollaboratorError::io("deliver", &dest, e))?;
        info!(unit_id = %request.unit_id, path = %dest.display(), "patron deliverable written");
        Ok(dest)
    }
}

fn write_zip(out: &Path, images: &[PathBuf]) -> std::io::Result<()> {
    let mut zip = ZipWriter::new(BufWriter::new(File::create(out)?));
    // TIFFs do not compress meaningfully; store them as-is.
    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Stored)
        .large_file(true);
    for image in images {
        let name = image
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        zip.start_file(name, options)?;
        let mut source = File::open(image)?;
        std::io::copy(&mut source, &mut zip)?;
    }
    zip.finish()?.flush()
}
