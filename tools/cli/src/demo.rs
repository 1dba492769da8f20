//! Offline drive used by `--demo`.

use anyhow::{Context, Result};
use std::sync::Arc;

use campusdrive_drive::{DriveClient, MemoryDrive, StaticTokenProvider};
use campusdrive_tabular::{Column, ColumnData, Table, TabularCodec, XlsxCodec};

/// Shared folder name of the demo drive.
pub const FOLDER: &str = "datacampus";

fn enrollment() -> Result<Table> {
    let table = Table::new(vec![
        Column::new(
            "course",
            ColumnData::Text(vec![
                "Algebra".into(),
                "Biology".into(),
                "Chemistry".into(),
                "History".into(),
            ]),
        ),
        Column::new("students", ColumnData::Integer(vec![42, 35, 28, 51])),
        Column::new("average", ColumnData::Float(vec![7.4, 8.1, 6.9, 7.8])),
    ])?;
    Ok(table)
}

/// Build an in-memory drive with a few folders and spreadsheets.
pub fn seed() -> Result<Arc<MemoryDrive>> {
    let codec = XlsxCodec::new();
    let drive = Arc::new(MemoryDrive::new());

    let root = drive.share_folder(FOLDER);
    let year = drive.add_folder(&root, "2024");
    let reports = drive.add_folder(&year, "reports");
    drive.add_folder(&root, "archive");

    let sample = codec
        .encode(&Table::placeholder())
        .context("Failed to encode demo spreadsheet")?;
    drive.add_file(&root, "sample.xlsx", sample);

    let enrollment = codec
        .encode(&enrollment()?)
        .context("Failed to encode demo spreadsheet")?;
    drive.add_file(&reports, "enrollment.xlsx", enrollment);
    drive.add_file(&year, "readme.txt", b"Demo data for campusdrive".to_vec());

    Ok(drive)
}

/// A drive client over a freshly seeded demo drive.
pub fn client() -> Result<Arc<DriveClient>> {
    let drive = seed()?;
    Ok(Arc::new(DriveClient::new(
        MemoryDrive::BASE_URL,
        drive,
        Arc::new(StaticTokenProvider::new("demo-token")),
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use campusdrive_navigator::Navigator;

    #[tokio::test]
    async fn test_demo_tree() {
        let mut navigator = Navigator::new(client().unwrap(), FOLDER);
        navigator.initialize().await.unwrap();

        let names: Vec<String> = navigator
            .list_current()
            .await
            .unwrap()
            .into_iter()
            .map(|i| i.name)
            .collect();
        assert_eq!(names, vec!["2024", "archive", "sample.xlsx"]);

        navigator.enter_path("2024/reports").await.unwrap();
        let file = navigator.find("enrollment.xlsx", None).await.unwrap().unwrap();
        let table = navigator.read_file(&file.id).await.unwrap();
        assert_eq!(table.height(), 4);
        assert_eq!(table.column_names(), vec!["course", "students", "average"]);
    }
}
