//! Built-in offline content stages.
//!
//! These are deterministic stand-ins for the provider-backed agents: they
//! produce well-formed outputs from the topic and upstream data alone, so a
//! full pipeline runs without network access. Real providers plug in by
//! implementing [`Stage`] under the same names.

use super::{SpeechSynthesizer, Stage};
use crate::config::StagesConfig;
use crate::context::{StageContext, Tone};
use crate::core::{StageArtifact, StageOutput};
use crate::errors::StageError;
use async_trait::async_trait;
use regex::Regex;
use serde_json::{json, Value};
use std::sync::{Arc, LazyLock};

/// Router stage name.
pub const ROUTER: &str = "router";
/// Researcher stage name.
pub const RESEARCHER: &str = "researcher";
/// Planner stage name.
pub const PLANNER: &str = "planner";
/// Section writer stage name.
pub const SECTION_WRITER: &str = "section_writer";
/// Merger stage name.
pub const MERGER: &str = "merger";
/// Image planner stage name.
pub const IMAGE_PLANNER: &str = "image_planner";
/// Image generator stage name.
pub const IMAGE_GENERATOR: &str = "image_generator";
/// Fact checker stage name.
pub const FACT_CHECKER: &str = "fact_checker";
/// Social writer stage name.
pub const SOCIAL_WRITER: &str = "social_writer";
/// Audio synthesizer stage name.
pub const AUDIO_SYNTHESIZER: &str = "audio_synthesizer";
/// Evaluator stage name.
pub const EVALUATOR: &str = "evaluator";

static H1: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"(?m)^# \S").ok());
static H2: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"(?m)^## \S").ok());
static H3: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"(?m)^### \S").ok());
static ABSOLUTE_CLAIM: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?i)\b(always|never|every|guaranteed|proven)\b").ok());

const SECTION_TITLES: [&str; 7] = [
    "Introduction to {topic}",
    "Core Concepts",
    "How It Works",
    "Practical Applications",
    "Challenges and Limitations",
    "Future Outlook",
    "Key Takeaways",
];

fn upstream<'a>(ctx: &'a StageContext, stage: &str) -> Result<&'a StageOutput, StageError> {
    ctx.upstream(stage)
        .ok_or_else(|| StageError::fatal(format!("missing output of upstream stage '{stage}'")))
}

fn article_content(ctx: &StageContext) -> Result<&str, StageError> {
    upstream(ctx, MERGER)?
        .get_str("content")
        .ok_or_else(|| StageError::fatal("merger output has no content"))
}

fn count_matches(pattern: &LazyLock<Option<Regex>>, text: &str) -> usize {
    pattern.as_ref().map_or(0, |re| re.find_iter(text).count())
}

fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Prose lines only: headings and blank lines removed.
fn prose(text: &str) -> String {
    text.lines()
        .filter(|line| !line.trim_start().starts_with('#') && !line.trim().is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn sentences(text: &str) -> Vec<&str> {
    text.split(['.', '!', '?'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}

fn truncate_chars(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text.to_string();
    }
    let mut out: String = text.chars().take(limit.saturating_sub(3)).collect();
    out.push_str("...");
    out
}

/// Decides how much fresh research the topic needs.
#[derive(Debug, Default)]
pub struct RouterStage;

#[async_trait]
impl Stage for RouterStage {
    fn name(&self) -> &str {
        ROUTER
    }

    async fn execute(&self, ctx: &StageContext) -> Result<StageOutput, StageError> {
        let topic = ctx.topic().to_lowercase();
        let (mode, recency_days) = if ["latest", "news", "today", "this week", "2025", "2026"]
            .iter()
            .any(|k| topic.contains(k))
        {
            ("open_book", 7)
        } else if ["trend", " vs ", "versus", "compare", "state of"]
            .iter()
            .any(|k| topic.contains(k))
        {
            ("hybrid", 45)
        } else {
            ("closed_book", 3650)
        };

        let topic = ctx.topic();
        let queries = vec![
            topic.to_string(),
            format!("{topic} overview"),
            format!("{topic} examples"),
        ];

        Ok(StageOutput::ok_empty()
            .with_value("mode", json!(mode))
            .with_value("recency_days", json!(recency_days))
            .with_value("queries", json!(queries))
            .with_metric("mode", json!(mode)))
    }
}

/// Gathers evidence for the router's queries.
#[derive(Debug, Default)]
pub struct ResearcherStage;

#[async_trait]
impl Stage for ResearcherStage {
    fn name(&self) -> &str {
        RESEARCHER
    }

    async fn execute(&self, ctx: &StageContext) -> Result<StageOutput, StageError> {
        let route = upstream(ctx, ROUTER)?;
        let queries: Vec<String> = route
            .get("queries")
            .and_then(Value::as_array)
            .map(|qs| qs.iter().filter_map(Value::as_str).map(str::to_string).collect())
            .unwrap_or_default();
        let recency_days = route.get("recency_days").and_then(Value::as_u64).unwrap_or(3650);

        let evidence: Vec<Value> = queries
            .iter()
            .enumerate()
            .map(|(i, query)| {
                json!({
                    "id": format!("ev-{i}"),
                    "title": format!("Notes on {query}"),
                    "snippet": format!("A summary of what is known about {query}."),
                    "source": "offline",
                    "max_age_days": recency_days,
                })
            })
            .collect();

        ctx.progress()
            .report(format!("Collected {} evidence items", evidence.len()));

        Ok(StageOutput::ok_empty()
            .with_metric("evidence_count", json!(evidence.len()))
            .with_artifact(StageArtifact::new(
                "research",
                "research",
                "Research notes",
                json!({ "evidence": evidence }),
            ))
            .with_value("evidence", json!(evidence)))
    }
}

/// Lays out the article; its `plan.tasks` drive the section fan-out.
#[derive(Debug)]
pub struct PlannerStage {
    sections: usize,
    section_words: usize,
}

impl PlannerStage {
    /// Creates a planner for `sections` sections (clamped to 1..=7).
    #[must_use]
    pub fn new(sections: usize, section_words: usize) -> Self {
        Self {
            sections: sections.clamp(1, SECTION_TITLES.len()),
            section_words: section_words.max(20),
        }
    }
}

#[async_trait]
impl Stage for PlannerStage {
    fn name(&self) -> &str {
        PLANNER
    }

    async fn execute(&self, ctx: &StageContext) -> Result<StageOutput, StageError> {
        let topic = ctx.topic();
        let options = &ctx.request().options;
        let tasks: Vec<Value> = SECTION_TITLES
            .iter()
            .take(self.sections)
            .enumerate()
            .map(|(id, title)| {
                let title = title.replace("{topic}", topic);
                json!({
                    "id": id,
                    "title": title,
                    "goal": format!("Explain {} for readers new to {topic}", title.to_lowercase()),
                    "target_words": self.section_words,
                })
            })
            .collect();

        let plan = json!({
            "title": topic,
            "tone": options.tone.unwrap_or(Tone::Professional),
            "audience": options.audience.clone().unwrap_or_else(|| "general".to_string()),
            "tasks": tasks,
        });

        Ok(StageOutput::ok_value("plan", plan.clone())
            .with_metric("tasks", json!(self.sections))
            .with_artifact(StageArtifact::new("plan", "plan", "Content plan", plan)))
    }
}

/// Writes one section per planned task.
#[derive(Debug, Default)]
pub struct SectionWriterStage;

impl SectionWriterStage {
    fn body(topic: &str, title: &str, tone: Option<Tone>, target_words: usize) -> String {
        let lower = title.to_lowercase();
        let opener = match tone {
            Some(Tone::Conversational | Tone::Casual) => {
                format!("Let's look at {lower} and why it matters for {topic}.")
            }
            Some(Tone::Academic) => {
                format!("This section examines {lower} within the study of {topic}.")
            }
            Some(Tone::Technical) => format!("This section details {lower} in {topic}."),
            Some(Tone::Professional) | None => {
                format!("{title} is a central part of understanding {topic}.")
            }
        };
        let templates = [
            format!("Practitioners approach {lower} by breaking the problem into smaller steps."),
            format!("Evidence gathered during research shows how {topic} develops over time."),
            "Each decision here has trade-offs that shape the final outcome.".to_string(),
            format!("Teams that invest early in {lower} tend to move faster later."),
            format!("Clear examples make {lower} easier to apply in practice."),
        ];

        let mut sentences = vec![opener];
        let mut words = word_count(&sentences[0]);
        for template in templates.iter().cycle() {
            if words >= target_words {
                break;
            }
            words += word_count(template);
            sentences.push(template.clone());
        }
        sentences.join(" ")
    }
}

#[async_trait]
impl Stage for SectionWriterStage {
    fn name(&self) -> &str {
        SECTION_WRITER
    }

    async fn execute(&self, ctx: &StageContext) -> Result<StageOutput, StageError> {
        let task = ctx
            .task()
            .ok_or_else(|| StageError::fatal("section writer requires a task input"))?;
        let title = task
            .input
            .get("title")
            .and_then(Value::as_str)
            .map_or_else(|| format!("Section {}", task.index + 1), str::to_string);
        let target_words = task
            .input
            .get("target_words")
            .and_then(Value::as_u64)
            .and_then(|n| usize::try_from(n).ok())
            .unwrap_or(150);

        let body = Self::body(ctx.topic(), &title, ctx.request().options.tone, target_words);
        let markdown = format!(
            "## {title}\n\n{body}\n\n### Key Points\n\n- {title} shapes how {} is applied.\n- Start small and iterate.",
            ctx.topic()
        );
        let words = word_count(&markdown);

        Ok(StageOutput::ok_empty()
            .with_value("task_id", json!(task.index))
            .with_value("title", json!(title))
            .with_value("markdown", json!(markdown))
            .with_metric("words", json!(words))
            .with_artifact(StageArtifact::new(
                "section",
                format!("section-{}", task.index),
                title,
                json!({ "markdown": markdown, "word_count": words }),
            )))
    }
}

/// Merges the ordered sections into the article.
#[derive(Debug, Default)]
pub struct MergerStage;

#[async_trait]
impl Stage for MergerStage {
    fn name(&self) -> &str {
        MERGER
    }

    async fn execute(&self, ctx: &StageContext) -> Result<StageOutput, StageError> {
        let sections: Vec<&str> = ctx
            .task_outputs()
            .iter()
            .map(|output| {
                output
                    .get_str("markdown")
                    .ok_or_else(|| StageError::fatal("section output has no markdown"))
            })
            .collect::<Result<_, _>>()?;
        if sections.is_empty() {
            return Err(StageError::fatal("no sections to merge"));
        }

        let title = ctx
            .plan()
            .and_then(|plan| plan.title())
            .unwrap_or_else(|| ctx.topic())
            .to_string();
        let content = format!("# {title}\n\n{}", sections.join("\n\n"));
        let words = word_count(&content);

        Ok(StageOutput::ok_empty()
            .with_value("title", json!(title))
            .with_value("content", json!(content))
            .with_value("word_count", json!(words))
            .with_metric("sections", json!(sections.len()))
            .with_metric("word_count", json!(words))
            .with_artifact(StageArtifact::new(
                "article",
                "article",
                title.clone(),
                json!({ "title": title, "content": content, "word_count": words }),
            )))
    }
}

/// Plans a hero image and one image per section heading, up to four.
#[derive(Debug, Default)]
pub struct ImagePlannerStage;

#[async_trait]
impl Stage for ImagePlannerStage {
    fn name(&self) -> &str {
        IMAGE_PLANNER
    }

    async fn execute(&self, ctx: &StageContext) -> Result<StageOutput, StageError> {
        let content = article_content(ctx)?;
        let mut images = vec![json!({
            "id": "image-hero",
            "placement": "hero",
            "prompt": format!("Editorial illustration of {}", ctx.topic()),
        })];
        images.extend(
            content
                .lines()
                .filter_map(|line| line.strip_prefix("## "))
                .take(3)
                .enumerate()
                .map(|(i, heading)| {
                    json!({
                        "id": format!("image-{}", i + 1),
                        "placement": heading,
                        "prompt": format!("Diagram explaining {heading}"),
                    })
                }),
        );

        Ok(StageOutput::ok_value("images", json!(images))
            .with_metric("images", json!(images.len()))
            .with_artifact(StageArtifact::new(
                "image_plan",
                "image-plan",
                "Image plan",
                json!({ "images": images }),
            )))
    }
}

/// Renders planned images as placeholder assets.
#[derive(Debug, Default)]
pub struct ImageGeneratorStage;

#[async_trait]
impl Stage for ImageGeneratorStage {
    fn name(&self) -> &str {
        IMAGE_GENERATOR
    }

    async fn execute(&self, ctx: &StageContext) -> Result<StageOutput, StageError> {
        let planned = upstream(ctx, IMAGE_PLANNER)?
            .get("images")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        let artifacts: Vec<StageArtifact> = planned
            .iter()
            .filter_map(|image| {
                let id = image.get("id")?.as_str()?;
                let prompt = image.get("prompt")?.as_str()?;
                Some(StageArtifact::new(
                    "image",
                    id,
                    id,
                    json!({
                        "url": format!("placeholder://{id}.png"),
                        "alt": prompt,
                        "placement": image.get("placement").cloned().unwrap_or(Value::Null),
                    }),
                ))
            })
            .collect();

        Ok(StageOutput::ok_empty()
            .with_metric("images", json!(artifacts.len()))
            .with_artifacts(artifacts))
    }
}

/// Reviews the article's claims and emits a "Score: N/10" report.
#[derive(Debug, Default)]
pub struct FactCheckerStage;

#[async_trait]
impl Stage for FactCheckerStage {
    fn name(&self) -> &str {
        FACT_CHECKER
    }

    async fn execute(&self, ctx: &StageContext) -> Result<StageOutput, StageError> {
        let text = prose(article_content(ctx)?);
        let claims = sentences(&text);
        let flagged: Vec<&str> = claims
            .iter()
            .copied()
            .filter(|s| {
                ABSOLUTE_CLAIM
                    .as_ref()
                    .is_some_and(|re| re.is_match(s))
            })
            .collect();
        let has_evidence = ctx
            .upstream(RESEARCHER)
            .and_then(|o| o.get("evidence"))
            .and_then(Value::as_array)
            .is_some_and(|e| !e.is_empty());

        let penalty = flagged.len() + if has_evidence { 0 } else { 2 };
        let score = 10usize.saturating_sub(penalty).max(1);

        let mut report = format!(
            "Fact Check Report\nClaims reviewed: {}\nFlagged: {}\n",
            claims.len(),
            flagged.len()
        );
        for claim in &flagged {
            report.push_str(&format!("- Unsupported absolute claim: \"{claim}\"\n"));
        }
        report.push_str(&format!("Score: {score}/10"));

        Ok(StageOutput::ok_value("score", json!(score))
            .with_metric("score", json!(score))
            .with_metric("flagged", json!(flagged.len()))
            .with_artifact(StageArtifact::new(
                "fact_check",
                "fact-check",
                "Fact check report",
                json!({
                    "report": report,
                    "score": score,
                    "claims": claims.len(),
                    "flagged": flagged.len(),
                }),
            )))
    }
}

/// Writes one promotional asset per configured channel.
#[derive(Debug)]
pub struct SocialWriterStage {
    channels: Vec<String>,
}

impl SocialWriterStage {
    /// Creates a social writer for the given channels.
    #[must_use]
    pub fn new(channels: Vec<String>) -> Self {
        Self { channels }
    }

    fn asset(channel: &str, title: &str, summary: &str) -> Value {
        match channel {
            "twitter" => json!({ "text": truncate_chars(&format!("{title}: {summary}"), 280) }),
            "linkedin" => json!({
                "text": truncate_chars(&format!("{title}\n\n{summary}\n\nWhat is your take?"), 1300)
            }),
            "facebook" => json!({ "text": truncate_chars(&format!("{title} - {summary}"), 500) }),
            "email" => json!({
                "subject": truncate_chars(&format!("New: {title}"), 80),
                "body": format!("Hi,\n\n{summary}\n\nRead the full article for more."),
            }),
            "youtube" => json!({
                "title": truncate_chars(title, 100),
                "description": truncate_chars(summary, 5000),
            }),
            "landing" => json!({ "headline": title, "body": summary }),
            other => json!({ "text": format!("[{other}] {title}: {summary}") }),
        }
    }
}

#[async_trait]
impl Stage for SocialWriterStage {
    fn name(&self) -> &str {
        SOCIAL_WRITER
    }

    async fn execute(&self, ctx: &StageContext) -> Result<StageOutput, StageError> {
        let content = article_content(ctx)?;
        let title = upstream(ctx, MERGER)?
            .get_str("title")
            .unwrap_or_else(|| ctx.topic())
            .to_string();
        let text = prose(content);
        let summary = sentences(&text)
            .into_iter()
            .take(2)
            .map(|s| format!("{s}."))
            .collect::<Vec<_>>()
            .join(" ");

        let artifacts: Vec<StageArtifact> = self
            .channels
            .iter()
            .map(|channel| {
                let mut asset = Self::asset(channel, &title, &summary);
                if let Some(map) = asset.as_object_mut() {
                    map.insert("channel".to_string(), json!(channel));
                }
                StageArtifact::new("social", format!("social-{channel}"), channel.clone(), asset)
            })
            .collect();

        Ok(StageOutput::ok_empty()
            .with_value("channels", json!(self.channels))
            .with_metric("assets", json!(artifacts.len()))
            .with_artifacts(artifacts))
    }
}

/// Narrates the article through a [`SpeechSynthesizer`].
///
/// Declines when the synthesizer is unavailable.
pub struct AudioSynthesizerStage {
    synthesizer: Arc<dyn SpeechSynthesizer>,
}

impl AudioSynthesizerStage {
    /// Creates the stage over a synthesizer.
    #[must_use]
    pub fn new(synthesizer: Arc<dyn SpeechSynthesizer>) -> Self {
        Self { synthesizer }
    }
}

impl std::fmt::Debug for AudioSynthesizerStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioSynthesizerStage")
            .field("available", &self.synthesizer.is_available())
            .finish()
    }
}

#[async_trait]
impl Stage for AudioSynthesizerStage {
    fn name(&self) -> &str {
        AUDIO_SYNTHESIZER
    }

    async fn execute(&self, ctx: &StageContext) -> Result<StageOutput, StageError> {
        if !self.synthesizer.is_available() {
            return Ok(StageOutput::skip("speech synthesizer unavailable"));
        }
        let script = prose(article_content(ctx)?);
        ctx.progress()
            .report(format!("Synthesizing {} words", word_count(&script)));

        let audio = self.synthesizer.synthesize(&script).await?;
        let sha256 = audio.sha256();

        Ok(StageOutput::ok_empty()
            .with_metric("size_bytes", json!(audio.bytes.len()))
            .with_artifact(StageArtifact::new(
                "audio",
                "audio",
                "Narration",
                json!({
                    "format": audio.format,
                    "size_bytes": audio.bytes.len(),
                    "sha256": sha256,
                    "script_words": word_count(&script),
                }),
            )))
    }
}

/// Scores the article's structure and readability.
#[derive(Debug, Default)]
pub struct EvaluatorStage;

impl EvaluatorStage {
    /// Structure score out of 10 from heading counts.
    #[must_use]
    pub fn structure_score(h1: usize, h2: usize, h3: usize) -> f64 {
        let mut score = 0.0;
        if h1 == 1 {
            score += 3.0;
        }
        if (3..=7).contains(&h2) {
            score += 4.0;
        }
        if h3 >= 2 {
            score += 3.0;
        }
        score
    }

    /// Readability out of 10; sentences longer than 20 words cost half a point
    /// per extra word on average.
    #[must_use]
    pub fn readability_score(text: &str) -> f64 {
        let text = prose(text);
        let sentences = sentences(&text);
        if sentences.is_empty() {
            return 0.0;
        }
        #[allow(clippy::cast_precision_loss)]
        let average = word_count(&text) as f64 / sentences.len() as f64;
        (10.0 - (average - 20.0).max(0.0) / 2.0).clamp(0.0, 10.0)
    }
}

#[async_trait]
impl Stage for EvaluatorStage {
    fn name(&self) -> &str {
        EVALUATOR
    }

    async fn execute(&self, ctx: &StageContext) -> Result<StageOutput, StageError> {
        let content = article_content(ctx)?;
        let (h1, h2, h3) = (
            count_matches(&H1, content),
            count_matches(&H2, content),
            count_matches(&H3, content),
        );
        let structure = Self::structure_score(h1, h2, h3);
        let readability = Self::readability_score(content);
        let fact_check = ctx
            .upstream(FACT_CHECKER)
            .and_then(|o| o.get("score"))
            .and_then(Value::as_f64);

        let mut parts = vec![structure, readability];
        parts.extend(fact_check);
        #[allow(clippy::cast_precision_loss)]
        let overall = (parts.iter().sum::<f64>() / parts.len() as f64 * 10.0).round() / 10.0;

        Ok(StageOutput::ok_value("overall_score", json!(overall))
            .with_metric("overall_score", json!(overall))
            .with_artifact(StageArtifact::new(
                "evaluation",
                "evaluation",
                "Quality evaluation",
                json!({
                    "h1": h1,
                    "h2": h2,
                    "h3": h3,
                    "word_count": word_count(content),
                    "structure_score": structure,
                    "readability_score": readability,
                    "fact_check_score": fact_check,
                    "overall_score": overall,
                }),
            )))
    }
}

/// The stage implementations a content graph is built from.
#[derive(Debug, Clone)]
pub struct ContentStages {
    /// Router.
    pub router: Arc<dyn Stage>,
    /// Researcher.
    pub researcher: Arc<dyn Stage>,
    /// Planner (producer, interrupt point).
    pub planner: Arc<dyn Stage>,
    /// Section writer (parallel unit).
    pub section_writer: Arc<dyn Stage>,
    /// Merger (reducer).
    pub merger: Arc<dyn Stage>,
    /// Image planner.
    pub image_planner: Arc<dyn Stage>,
    /// Image generator.
    pub image_generator: Arc<dyn Stage>,
    /// Fact checker.
    pub fact_checker: Arc<dyn Stage>,
    /// Social writer.
    pub social_writer: Arc<dyn Stage>,
    /// Audio synthesizer (optional).
    pub audio_synthesizer: Arc<dyn Stage>,
    /// Evaluator.
    pub evaluator: Arc<dyn Stage>,
}

impl ContentStages {
    /// The offline stages, with audio backed by the given synthesizer.
    #[must_use]
    pub fn offline(config: &StagesConfig, synthesizer: Arc<dyn SpeechSynthesizer>) -> Self {
        Self {
            router: Arc::new(RouterStage),
            researcher: Arc::new(ResearcherStage),
            planner: Arc::new(PlannerStage::new(config.sections, config.section_words)),
            section_writer: Arc::new(SectionWriterStage),
            merger: Arc::new(MergerStage),
            image_planner: Arc::new(ImagePlannerStage),
            image_generator: Arc::new(ImageGeneratorStage),
            fact_checker: Arc::new(FactCheckerStage),
            social_writer: Arc::new(SocialWriterStage::new(config.social_channels.clone())),
            audio_synthesizer: Arc::new(AudioSynthesizerStage::new(synthesizer)),
            evaluator: Arc::new(EvaluatorStage),
        }
    }

    /// The offline stages, with audio piped through the configured command.
    #[must_use]
    pub fn from_config(config: &StagesConfig) -> Self {
        let synthesizer = super::CommandSynthesizer::new(
            config.tts_command.clone(),
            config.tts_args.clone(),
        );
        Self::offline(config, Arc::new(synthesizer))
    }
}
