//! I/O utilities.
//!
//! Output goes either to a file or to standard output, depending on whether
//! the user passed `--out`.

use tokio::{
    fs::File,
    io::{AsyncWrite, AsyncWriteExt as _, BufWriter},
};

use crate::prelude::*;

/// Create an [`AsyncWrite`] for a file or stdout.
pub async fn create_writer(
    path: Option<&Path>,
) -> Result<Box<dyn AsyncWrite + Unpin + Send + Sync + 'static>> {
    match path {
        Some(path) => {
            let file = File::create(path)
                .await
                .with_context(|| format!("Failed to create file at path: {:?}", path))?;
            Ok(Box::new(file))
        }
        None => Ok(Box::new(tokio::io::stdout())),
    }
}

/// Write a string to either standard output or a file, adding a trailing
/// newline if one is missing.
pub async fn write_text(path: Option<&Path>, text: &str) -> Result<()> {
    let mut writer = BufWriter::new(create_writer(path).await?);
    writer
        .write_all(text.as_bytes())
        .await
        .context("Failed to write output")?;
    if !text.ends_with('\n') {
        writer
            .write_all(b"\n")
            .await
            .context("Failed to write newline to output")?;
    }
    writer.flush().await.context("Failed to flush output")?;
    Ok(())
}

/// Write a value as pretty-printed JSON to either standard output or a file.
pub async fn write_json_pretty<T>(path: Option<&Path>, value: &T) -> Result<()>
where
    T: Serialize + ?Sized,
{
    let json =
        serde_json::to_string_pretty(value).context("Failed to serialize JSON output")?;
    write_text(path, &json).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn write_text_adds_trailing_newline() -> Result<()> {
        let dir = tempfile::TempDir::with_prefix("io")?;
        let path = dir.path().join("out.txt");
        write_text(Some(&path), "hello").await?;
        assert_eq!(tokio::fs::read_to_string(&path).await?, "hello\n");
        Ok(())
    }

    #[tokio::test]
    async fn write_json_pretty_round_trips() -> Result<()> {
        let dir = tempfile::TempDir::with_prefix("io")?;
        let path = dir.path().join("out.json");
        write_json_pretty(Some(&path), &json!({ "status": "completed" })).await?;
        let written = tokio::fs::read_to_string(&path).await?;
        let value: serde_json::Value = serde_json::from_str(&written)?;
        assert_eq!(value["status"], "completed");
        Ok(())
    }
}
