//! Command-line renderer
//!
//! HTML comes from `highlight`, PNG from `silicon`. The code is piped on
//! stdin; PNGs are written to a uuid-named file under the temp dir and read
//! back.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{BotError, Result};
use crate::platform::{RenderFormat, Renderer};

const RENDER_TIMEOUT: Duration = Duration::from_secs(30);

const HTML_FONTS: &str = "ui-monospace,monospace,mono,monaco,Consolas,Andale Mono,AndaleMono,\
Lucida Console,Lucida Sans Typewriter,Lucida Typewriter,Courier New,Courier,Bitstream Vera Sans Mono";

const PNG_FONTS: &str = "Iosevka Term Custom; Symbols Nerd Font; NanumGothicCoding; OpenMoji";

#[derive(Debug, Clone)]
pub struct CommandRenderer {
    highlight: PathBuf,
    silicon: PathBuf,
    background_image: Option<PathBuf>,
    scratch_dir: PathBuf,
}

impl Default for CommandRenderer {
    fn default() -> Self {
        Self {
            highlight: PathBuf::from("highlight"),
            silicon: PathBuf::from("silicon"),
            background_image: None,
            scratch_dir: std::env::temp_dir().join("ccb_png"),
        }
    }
}

impl CommandRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_background_image(mut self, path: Option<PathBuf>) -> Self {
        self.background_image = path;
        self
    }

    pub fn with_programs(mut self, highlight: impl Into<PathBuf>, silicon: impl Into<PathBuf>) -> Self {
        self.highlight = highlight.into();
        self.silicon = silicon.into();
        self
    }

    fn html_args(ext: &str, theme: &str) -> Vec<String> {
        vec![
            format!("--syntax={}", ext),
            format!("--style={}", theme),
            "--line-numbers".into(),
            "--out-format=html".into(),
            "--include-style".into(),
            "--encoding=UTF-8".into(),
            format!("--font={}", HTML_FONTS),
        ]
    }

    fn png_args(&self, out: &Path, ext: &str, theme: &str) -> Vec<String> {
        let mut args = vec![
            "-o".to_string(),
            out.display().to_string(),
            "-l".into(),
            ext.into(),
            "--theme".into(),
            theme.into(),
            "--pad-horiz".into(),
            "20".into(),
            "--pad-vert".into(),
            "25".into(),
            "--shadow-blur-radius".into(),
            "5".into(),
        ];
        if let Some(bg) = &self.background_image {
            args.push("--background-image".into());
            args.push(bg.display().to_string());
        }
        args.push("-f".into());
        args.push(PNG_FONTS.into());
        args
    }

    /// Run `program` with `code` on stdin, returning stdout
    async fn run(program: &Path, args: &[String], code: &str) -> Result<Vec<u8>> {
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| BotError::Render(format!("failed to spawn {}: {}", program.display(), e)))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(code.as_bytes())
                .await
                .map_err(|e| BotError::Render(format!("failed to write code: {}", e)))?;
        }

        let output = tokio::time::timeout(RENDER_TIMEOUT, child.wait_with_output())
            .await
            .map_err(|_| BotError::Render(format!("{} timed out", program.display())))?
            .map_err(|e| BotError::Render(e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(BotError::Render(format!(
                "{} exited with {}: {}",
                program.display(),
                output.status,
                stderr.trim()
            )));
        }
        Ok(output.stdout)
    }

    async fn render_png(&self, code: &str, ext: &str, theme: &str) -> Result<Vec<u8>> {
        tokio::fs::create_dir_all(&self.scratch_dir)
            .await
            .map_err(|e| BotError::Render(format!("scratch dir: {}", e)))?;
        let out = self.scratch_dir.join(format!("{}.png", Uuid::new_v4()));

        let result = match Self::run(&self.silicon, &self.png_args(&out, ext, theme), code).await {
            Ok(_) => tokio::fs::read(&out)
                .await
                .map_err(|e| BotError::Render(format!("reading {}: {}", out.display(), e))),
            Err(e) => Err(e),
        };

        if let Err(e) = tokio::fs::remove_file(&out).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %out.display(), error = %e, "failed to remove rendered image");
            }
        }
        result
    }
}

#[async_trait]
impl Renderer for CommandRenderer {
    async fn render(&self, code: &str, ext: &str, theme: &str, format: RenderFormat) -> Result<Vec<u8>> {
        debug!(ext, theme, ?format, bytes = code.len(), "rendering");
        match format {
            RenderFormat::Html => Self::run(&self.highlight, &Self::html_args(ext, theme), code).await,
            RenderFormat::Png => self.render_png(code, ext, theme).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_html_args() {
        let args = CommandRenderer::html_args("py", "base16/bright");
        assert_eq!(args[0], "--syntax=py");
        assert_eq!(args[1], "--style=base16/bright");
        assert!(args.contains(&"--include-style".to_string()));
    }

    #[test]
    fn test_png_args_background_optional() {
        let renderer = CommandRenderer::new();
        let args = renderer.png_args(Path::new("/tmp/x.png"), "rs", "Coldark-Dark");
        assert!(!args.contains(&"--background-image".to_string()));
        assert_eq!(args.last().map(String::as_str), Some(PNG_FONTS));

        let renderer = renderer.with_background_image(Some(PathBuf::from("/srv/bg.jpg")));
        let args = renderer.png_args(Path::new("/tmp/x.png"), "rs", "Coldark-Dark");
        let i = args.iter().position(|a| a == "--background-image").unwrap();
        assert_eq!(args[i + 1], "/srv/bg.jpg");
    }

    #[tokio::test]
    async fn test_missing_program_is_render_error() {
        let renderer = CommandRenderer::new().with_programs("ccb-no-such-highlight", "ccb-no-such-silicon");
        let err = renderer
            .render("x = 1", "py", "github", RenderFormat::Html)
            .await
            .unwrap_err();
        assert!(matches!(err, BotError::Render(_)));
        assert!(!err.is_transient());
    }
}
