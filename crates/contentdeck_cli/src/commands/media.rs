use std::path::Path;

use contentdeck::media::{UploadReport, format_file_size};
use contentdeck::{MediaFile, Upload};
use serde::Serialize;
use tabled::Tabled;

use crate::MediaAction;
use crate::commands::shared::{Context, OutputFormat, print_json, print_rows, success, warning};

#[derive(Debug, Serialize, Tabled)]
pub(crate) struct MediaRow {
    #[tabled(rename = "Path")]
    pub path: String,
    #[tabled(rename = "Type")]
    pub content_type: String,
    #[tabled(rename = "Size")]
    pub size: String,
    #[tabled(rename = "Uploaded")]
    pub uploaded_at: String,
}

impl From<&MediaFile> for MediaRow {
    fn from(file: &MediaFile) -> Self {
        Self {
            path: file.path.clone(),
            content_type: file.content_type.clone(),
            size: format_file_size(file.size),
            uploaded_at: file.uploaded_at.format("%Y-%m-%d %H:%M").to_string(),
        }
    }
}

/// Handle `contentdeck media`.
pub(crate) async fn handle_media(
    action: MediaAction,
    ctx: &Context,
) -> Result<(), Box<dyn std::error::Error>> {
    match action {
        MediaAction::List { output } => {
            let files = ctx.media.list().await?;
            print_media(&files, output);
        }
        MediaAction::Upload { files, output } => {
            let uploads = files
                .iter()
                .map(|path| read_upload(path))
                .collect::<Result<Vec<_>, _>>()?;

            let report = ctx.media.upload_files(uploads).await?;
            print_media(&report.uploaded, output);
            summarize(&report)?;
        }
    }

    Ok(())
}

fn read_upload(path: &Path) -> Result<Upload, Box<dyn std::error::Error>> {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| format!("Invalid file name: {}", path.display()))?;
    let data = std::fs::read(path)?;
    Ok(Upload::from_name(name, data))
}

fn print_media(files: &[MediaFile], output: OutputFormat) {
    match output {
        OutputFormat::Table => {
            let rows: Vec<MediaRow> = files.iter().map(MediaRow::from).collect();
            print_rows(&rows, output);
        }
        OutputFormat::Json => print_json(files),
    }
}

fn summarize(report: &UploadReport) -> Result<(), Box<dyn std::error::Error>> {
    for error in &report.errors {
        warning(error);
    }
    if report.uploaded.is_empty() && !report.errors.is_empty() {
        return Err("No files were uploaded".into());
    }
    success(format!("Uploaded {} file(s)", report.uploaded.len()));
    Ok(())
}
