//! Hub authentication and pretrained artifact retrieval.
use anyhow::{bail, Context, Result};
use hf_hub::api::sync::{Api, ApiBuilder};
use hf_hub::{Cache, Repo, RepoType};
use std::io::Write;
use std::path::PathBuf;

pub const ESM3_OPEN_SMALL: &str = "esm3_sm_open_v1";

const ESM3_OPEN_SMALL_REPO: &str = "EvolutionaryScale/esm3-sm-open-v1";
const ESM3_OPEN_SMALL_WEIGHTS: &str = "data/weights/esm3_sm_open_v1.pth";

/// Resolves a Hugging Face credential and builds an authenticated API
/// client. Resolution order: explicit token, `HF_TOKEN`, the cached hub
/// token, then an interactive prompt. A failure here is fatal to the run.
pub fn login(token: Option<String>) -> Result<Api> {
    let token = match token
        .or_else(|| std::env::var("HF_TOKEN").ok())
        .or_else(|| Cache::default().token())
    {
        Some(token) => token,
        None => prompt_for_token()?,
    };
    ApiBuilder::new()
        .with_token(Some(token))
        .build()
        .context("failed to build Hugging Face API client")
}

fn prompt_for_token() -> Result<String> {
    print!("Hugging Face API token: ");
    std::io::stdout().flush()?;
    let mut token = String::new();
    std::io::stdin().read_line(&mut token)?;
    let token = token.trim().to_string();
    if token.is_empty() {
        bail!("no Hugging Face API token provided");
    }
    Ok(token)
}

/// Downloads (or reuses the cached copy of) the weights for a named model,
/// returning the local path.
pub fn fetch_weights(api: &Api, model_name: &str) -> Result<PathBuf> {
    let (repo_id, weights_file) = hub_files_for(model_name)?;
    let repo = api.repo(Repo::with_revision(
        repo_id.to_string(),
        RepoType::Model,
        "main".to_string(),
    ));
    repo.get(weights_file)
        .with_context(|| format!("failed to fetch {weights_file} from {repo_id}"))
}

fn hub_files_for(model_name: &str) -> Result<(&'static str, &'static str)> {
    match model_name {
        ESM3_OPEN_SMALL => Ok((ESM3_OPEN_SMALL_REPO, ESM3_OPEN_SMALL_WEIGHTS)),
        other => bail!("{other} is not a known model name"),
    }
}
