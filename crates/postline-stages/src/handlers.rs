//! The production stage handlers.
//!
//! Each handler takes the job snapshot, talks to its collaborator service,
//! and returns a partial job update. Handlers are safe to re-run: a review
//! rewind invokes write and review again over the same job.

use std::path::PathBuf;
use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use regex::Regex;
use tokio::sync::mpsc;

use postline_core::job::{Job, JobPatch, PostMetadata, PrResult, ResearchData, ReviewResult, Source, ValidationResult};
use postline_core::progress::StageEvent;
use postline_core::stage::StageHandler;
use postline_core::{Error, Result};

use crate::github::GitHubClient;
use crate::llm::InferenceClient;
use crate::search::SearchClient;

static SLUG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9]+(?:-[a-z0-9]+)*$").expect("valid slug pattern"));

/// Posts shorter than this fail validation.
const MIN_CONTENT_CHARS: usize = 200;

const RESEARCH_SYSTEM: &str = "You are a research assistant for a blog. Given search results \
     about a topic, produce a dense factual summary a writer can draft from. Plain text only.";

const WRITE_SYSTEM: &str = "You are a blog writer. Draft a complete post in Markdown for the \
     given topic, following the research notes, the template, and any reviewer feedback.";

const REVIEW_SYSTEM: &str = "You are an editor. Score the draft and list concrete issues. Reply \
     with a JSON object: {\"overall_score\": number, \"scores\": {\"clarity\": number, \
     \"accuracy\": number, \"engagement\": number}, \"issues\": [string]}.";

const CREATE_SYSTEM: &str = "You prepare publication metadata for a finished post. Reply with a \
     JSON object: {\"title\": string, \"summary\": string, \"slug\": string, \"tags\": [string], \
     \"read_minutes\": number}.";

fn upstream(e: impl std::fmt::Display) -> Error {
    Error::Upstream(e.to_string())
}

/// Turn a title into a URL slug.
fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut last_dash = true;
    for ch in title.chars() {
        if ch.is_ascii_alphanumeric() {
            slug.push(ch.to_ascii_lowercase());
            last_dash = false;
        } else if !last_dash {
            slug.push('-');
            last_dash = true;
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    if slug.is_empty() {
        slug.push_str("untitled");
    }
    slug
}

fn render_document(metadata: &PostMetadata, body: &str, category: &str) -> String {
    let tags = metadata
        .tags
        .iter()
        .map(|t| format!("\"{t}\""))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "---\ntitle: \"{}\"\nsummary: \"{}\"\nslug: {}\ncategory: {}\ntags: [{}]\n---\n\n{}\n",
        metadata.title, metadata.summary, metadata.slug, category, tags, body
    )
}

/// Searches the web for the topic and condenses the hits into notes.
pub struct ResearchStage {
    pub search: Arc<SearchClient>,
    pub llm: Arc<InferenceClient>,
}

#[async_trait]
impl StageHandler for ResearchStage {
    async fn handle(&self, job: &Job, events: mpsc::Sender<StageEvent>) -> Result<JobPatch> {
        let query = if job.keywords.is_empty() {
            job.topic.clone()
        } else {
            format!("{} {}", job.topic, job.keywords.join(" "))
        };
        let _ = events
            .send(StageEvent::progress("research", format!("Searching for \"{query}\"")))
            .await;
        let hits = self.search.search(&query, 5).await.map_err(upstream)?;
        let sources: Vec<Source> = hits
            .into_iter()
            .map(|hit| Source {
                title: hit.title,
                url: hit.url,
                snippet: hit.snippet,
            })
            .collect();

        let _ = events
            .send(StageEvent::progress("research", "Summarizing sources"))
            .await;
        let mut prompt = format!("Topic: {}\n\nSearch results:\n", job.topic);
        for source in &sources {
            prompt.push_str(&format!(
                "- {} ({})\n  {}\n",
                source.title,
                source.url,
                source.snippet.as_deref().unwrap_or("")
            ));
        }
        let summary = self
            .llm
            .complete(RESEARCH_SYSTEM, &prompt)
            .await
            .map_err(upstream)?;

        Ok(JobPatch {
            research_data: Some(ResearchData { summary, sources }),
            ..Default::default()
        })
    }
}

/// Drafts the post; reviewer feedback on the job steers the re-draft.
pub struct WriteStage {
    pub llm: Arc<InferenceClient>,
}

#[async_trait]
impl StageHandler for WriteStage {
    async fn handle(&self, job: &Job, events: mpsc::Sender<StageEvent>) -> Result<JobPatch> {
        let mut prompt = format!("Topic: {}\nCategory: {}\n", job.topic, job.category.as_str());
        if let Some(template) = job.template {
            prompt.push_str(&format!("Template: {}\n", template.as_str()));
        }
        if let Some(reader) = &job.target_reader {
            prompt.push_str(&format!("Target reader: {reader}\n"));
        }
        if let Some(research) = &job.research_data {
            prompt.push_str(&format!("\nResearch notes:\n{}\n", research.summary));
        }
        if let Some(feedback) = &job.human_feedback {
            let _ = events
                .send(StageEvent::progress("write", "Re-drafting with reviewer feedback"))
                .await;
            prompt.push_str(&format!("\nReviewer feedback to address:\n{feedback}\n"));
            if let Some(previous) = &job.draft_content {
                prompt.push_str(&format!("\nPrevious draft:\n{previous}\n"));
            }
        }

        let draft = self
            .llm
            .complete(WRITE_SYSTEM, &prompt)
            .await
            .map_err(upstream)?;
        Ok(JobPatch {
            draft_content: Some(draft),
            ..Default::default()
        })
    }
}

/// Scores the draft and collects issues.
pub struct ReviewStage {
    pub llm: Arc<InferenceClient>,
}

#[async_trait]
impl StageHandler for ReviewStage {
    async fn handle(&self, job: &Job, _events: mpsc::Sender<StageEvent>) -> Result<JobPatch> {
        let draft = job
            .draft_content
            .as_deref()
            .ok_or_else(|| Error::Internal("review ran without a draft".to_string()))?;
        let prompt = format!("Topic: {}\n\nDraft:\n{}", job.topic, draft);
        let value = self
            .llm
            .complete_json(REVIEW_SYSTEM, &prompt)
            .await
            .map_err(upstream)?;
        let review: ReviewResult = serde_json::from_value(value)
            .map_err(|e| Error::Upstream(format!("malformed review: {e}")))?;
        Ok(JobPatch {
            review_result: Some(review),
            ..Default::default()
        })
    }
}

/// Produces publication metadata and freezes the draft as final content.
pub struct CreateStage {
    pub llm: Arc<InferenceClient>,
}

#[async_trait]
impl StageHandler for CreateStage {
    async fn handle(&self, job: &Job, _events: mpsc::Sender<StageEvent>) -> Result<JobPatch> {
        let draft = job
            .draft_content
            .clone()
            .ok_or_else(|| Error::Internal("create ran without a draft".to_string()))?;
        let prompt = format!("Topic: {}\n\nPost:\n{}", job.topic, draft);
        let value = self
            .llm
            .complete_json(CREATE_SYSTEM, &prompt)
            .await
            .map_err(upstream)?;
        let mut metadata: PostMetadata = serde_json::from_value(value)
            .map_err(|e| Error::Upstream(format!("malformed metadata: {e}")))?;
        if !SLUG_RE.is_match(&metadata.slug) {
            metadata.slug = slugify(&metadata.title);
        }
        Ok(JobPatch {
            metadata: Some(metadata),
            final_content: Some(draft),
            ..Default::default()
        })
    }
}

/// Writes the front-matter document under the content directory.
pub struct ExportStage {
    pub content_dir: PathBuf,
}

#[async_trait]
impl StageHandler for ExportStage {
    async fn handle(&self, job: &Job, events: mpsc::Sender<StageEvent>) -> Result<JobPatch> {
        let metadata = job
            .metadata
            .as_ref()
            .ok_or_else(|| Error::Internal("export ran without metadata".to_string()))?;
        let body = job
            .final_content
            .as_deref()
            .ok_or_else(|| Error::Internal("export ran without final content".to_string()))?;

        let document = render_document(metadata, body, job.category.as_str());
        let dir = self.content_dir.join(job.category.as_str());
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| Error::Internal(format!("creating {}: {e}", dir.display())))?;
        let path = dir.join(format!("{}.md", metadata.slug));
        tokio::fs::write(&path, document)
            .await
            .map_err(|e| Error::Internal(format!("writing {}: {e}", path.display())))?;

        let filepath = path.to_string_lossy().to_string();
        let _ = events
            .send(StageEvent::progress("export", format!("Wrote {filepath}")))
            .await;
        Ok(JobPatch {
            filepath: Some(filepath),
            ..Default::default()
        })
    }
}

/// Structural checks on the finished post. Finding problems is a normal
/// outcome recorded on the job, never an `Err`.
pub struct ValidateStage;

#[async_trait]
impl StageHandler for ValidateStage {
    async fn handle(&self, job: &Job, _events: mpsc::Sender<StageEvent>) -> Result<JobPatch> {
        let mut errors = Vec::new();

        match &job.final_content {
            None => errors.push("post has no final content".to_string()),
            Some(content) if content.chars().count() < MIN_CONTENT_CHARS => errors.push(format!(
                "content is shorter than {MIN_CONTENT_CHARS} characters"
            )),
            Some(_) => {}
        }

        match &job.metadata {
            None => errors.push("post has no metadata".to_string()),
            Some(metadata) => {
                if metadata.title.trim().is_empty() {
                    errors.push("title is empty".to_string());
                }
                if metadata.title.chars().count() > 120 {
                    errors.push("title is longer than 120 characters".to_string());
                }
                if metadata.summary.trim().is_empty() {
                    errors.push("summary is empty".to_string());
                }
                if !SLUG_RE.is_match(&metadata.slug) {
                    errors.push(format!("slug `{}` is not URL-safe", metadata.slug));
                }
            }
        }

        if job.filepath.is_none() {
            errors.push("post was never exported to a file".to_string());
        }

        Ok(JobPatch {
            validation_result: Some(ValidationResult {
                passed: errors.is_empty(),
                errors,
            }),
            ..Default::default()
        })
    }
}

/// Publishes the exported file: branch, commit, pull request.
pub struct DeployStage {
    pub github: Arc<GitHubClient>,
}

#[async_trait]
impl StageHandler for DeployStage {
    async fn handle(&self, job: &Job, events: mpsc::Sender<StageEvent>) -> Result<JobPatch> {
        let metadata = job
            .metadata
            .as_ref()
            .ok_or_else(|| Error::Internal("deploy ran without metadata".to_string()))?;
        let filepath = job
            .filepath
            .as_deref()
            .ok_or_else(|| Error::Internal("deploy ran without an exported file".to_string()))?;
        let document = tokio::fs::read_to_string(filepath)
            .await
            .map_err(|e| Error::Internal(format!("reading {filepath}: {e}")))?;

        let branch = format!("post/{}", metadata.slug);
        let _ = events
            .send(StageEvent::progress("deploy", format!("Creating branch {branch}")))
            .await;
        self.github.create_branch(&branch).await.map_err(upstream)?;

        let repo_path = format!("content/{}/{}.md", job.category.as_str(), metadata.slug);
        let commit = self
            .github
            .commit_file(
                &branch,
                &repo_path,
                &document,
                &format!("Add post: {}", metadata.title),
            )
            .await
            .map_err(upstream)?;

        let _ = events
            .send(StageEvent::progress("deploy", "Opening pull request"))
            .await;
        let pr = self
            .github
            .open_pull_request(&branch, &format!("New post: {}", metadata.title), &metadata.summary)
            .await
            .map_err(upstream)?;

        Ok(JobPatch {
            pr_result: Some(PrResult {
                branch,
                pr_number: Some(pr.number),
                pr_url: Some(pr.html_url),
            }),
            commit_hash: Some(commit),
            ..Default::default()
        })
    }
}
