use super::{json_pretty, Failure, EXIT_FAILURE, EXIT_SUCCESS};
use std::path::Path;
use strata_core::{BuildOptions, BuildResult, Engine};
use strata_fs::{DiskFs, FileSystem};
use tracing::{debug, info};

pub fn run(dir: &Path, output: Option<&Path>, options: BuildOptions, json: bool) -> Result<u8, Failure> {
    debug!(
        "build {} with {:?}, output {}",
        dir.display(),
        options,
        output.map_or_else(|| "stdout".to_owned(), |p| p.display().to_string())
    );
    let fs = DiskFs::cwd();
    let engine = Engine::with_options(&fs, options);

    let result = match (output, json) {
        (Some(path), _) => {
            let result = engine.render(dir)?;
            fs.write_file(path, result.output.as_bytes())
                .map_err(|e| Failure::new(EXIT_FAILURE, format!("failed to write output: {e}")))?;
            result
        }
        // The summary replaces the stream on stdout, so it carries the stream itself.
        (None, true) => engine.render(dir)?,
        (None, false) => engine.render_to(dir, &mut std::io::stdout().lock())?,
    };

    info!("rendered {} documents, digest {}", result.documents, result.digest);
    if json {
        println!("{}", json_pretty(&summary(&result, output))?);
    } else if let Some(path) = output {
        eprintln!(
            "wrote {} documents to {} ({})",
            result.documents,
            path.display(),
            result.digest.get(..12).unwrap_or_default()
        );
    }
    Ok(EXIT_SUCCESS)
}

fn summary(result: &BuildResult, output: Option<&Path>) -> serde_json::Value {
    let mut payload = serde_json::json!({
        "documents": result.documents,
        "digest": result.digest.as_str(),
    });
    match output {
        Some(path) => payload["output"] = serde_json::json!(path.display().to_string()),
        None => payload["stream"] = serde_json::json!(result.output),
    }
    payload
}
