//! Skills index loading with progressive disclosure.
//!
//! Only names, descriptions, and paths are injected into the system
//! prompt; the agent reads full skill content on demand through the
//! filesystem tools.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

/// An entry in the skills index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkillInfo {
    /// Skill name.
    pub name: String,
    /// One-line description.
    pub description: String,
    /// Path of the full skill document.
    pub path: String,
}

/// The default skills directory for a named agent:
/// `~/.fathom/agents/<agent_id>/skills`.
#[must_use]
pub fn skills_dir_for_agent(agent_id: &str) -> Option<PathBuf> {
    let home = std::env::var_os("HOME")?;
    Some(
        PathBuf::from(home)
            .join(".fathom")
            .join("agents")
            .join(agent_id)
            .join("skills"),
    )
}

/// Scan `dir` for `<skill>/SKILL.md` documents and build the index.
///
/// Unreadable entries are skipped; a missing directory yields an empty
/// index.
#[must_use]
pub fn load_skills_index(dir: &Path) -> Vec<SkillInfo> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        debug!(dir = %dir.display(), "skills directory not readable; empty index");
        return Vec::new();
    };

    let mut skills = Vec::new();
    for entry in entries.flatten() {
        let skill_dir = entry.path();
        if !skill_dir.is_dir() {
            continue;
        }
        let doc = skill_dir.join("SKILL.md");
        let Ok(body) = std::fs::read_to_string(&doc) else {
            continue;
        };
        let fallback_name = entry.file_name().to_string_lossy().into_owned();
        skills.push(parse_skill(&body, fallback_name, &doc));
    }
    skills.sort_by(|a, b| a.name.cmp(&b.name));
    skills
}

/// Parse a SKILL.md: front-matter `name:` / `description:` keys, with
/// the directory name and first body line as fallbacks.
fn parse_skill(body: &str, fallback_name: String, path: &Path) -> SkillInfo {
    let mut name = None;
    let mut description = None;

    let mut lines = body.lines().peekable();
    if lines.peek().is_some_and(|line| line.trim() == "---") {
        lines.next();
        for line in lines.by_ref() {
            let line = line.trim();
            if line == "---" {
                break;
            }
            if let Some(value) = line.strip_prefix("name:") {
                name = Some(value.trim().to_owned());
            } else if let Some(value) = line.strip_prefix("description:") {
                description = Some(value.trim().to_owned());
            }
        }
    }

    let description = description
        .or_else(|| {
            lines
                .map(str::trim)
                .find(|line| !line.is_empty() && !line.starts_with('#'))
                .map(str::to_owned)
        })
        .unwrap_or_default();

    SkillInfo {
        name: name.unwrap_or(fallback_name),
        description,
        path: path.to_string_lossy().into_owned(),
    }
}

/// Render the index as a system prompt section.
#[must_use]
pub fn render_skills_section(skills: &[SkillInfo]) -> String {
    if skills.is_empty() {
        return String::new();
    }
    let mut section = String::from(
        "\n\n## Skills\n\nThe following skills are available. Read a skill's \
         file with the read_file tool before using it.\n",
    );
    for skill in skills {
        section.push_str(&format!(
            "- {} ({}): {}\n",
            skill.name, skill.path, skill.description
        ));
    }
    section
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_skill(dir: &Path, name: &str, body: &str) {
        let skill_dir = dir.join(name);
        std::fs::create_dir_all(&skill_dir).unwrap();
        std::fs::write(skill_dir.join("SKILL.md"), body).unwrap();
    }

    #[test]
    fn loads_front_matter_fields() {
        let dir = tempfile::tempdir().unwrap();
        write_skill(
            dir.path(),
            "deploy",
            "---\nname: deploy-service\ndescription: Deploy to staging\n---\n# Steps\n",
        );

        let skills = load_skills_index(dir.path());
        assert_eq!(skills.len(), 1);
        assert_eq!(skills[0].name, "deploy-service");
        assert_eq!(skills[0].description, "Deploy to staging");
        assert!(skills[0].path.ends_with("SKILL.md"));
    }

    #[test]
    fn falls_back_to_dir_name_and_first_line() {
        let dir = tempfile::tempdir().unwrap();
        write_skill(dir.path(), "review", "# Review\nChecklist for code review.\n");

        let skills = load_skills_index(dir.path());
        assert_eq!(skills[0].name, "review");
        assert_eq!(skills[0].description, "Checklist for code review.");
    }

    #[test]
    fn missing_dir_is_empty_index() {
        let skills = load_skills_index(Path::new("/definitely/not/here"));
        assert!(skills.is_empty());
    }

    #[test]
    fn index_is_sorted_and_rendered() {
        let dir = tempfile::tempdir().unwrap();
        write_skill(dir.path(), "zeta", "---\nname: zeta\ndescription: z\n---\n");
        write_skill(dir.path(), "alpha", "---\nname: alpha\ndescription: a\n---\n");

        let skills = load_skills_index(dir.path());
        assert_eq!(skills[0].name, "alpha");

        let section = render_skills_section(&skills);
        assert!(section.contains("## Skills"));
        assert!(section.contains("- alpha"));
        assert!(section.contains("read_file"));
    }

    #[test]
    fn empty_index_renders_nothing() {
        assert!(render_skills_section(&[]).is_empty());
    }
}
