//! The roles a crew is assembled from.

use super::atomics::{AgentSpec, CrewKind};
use super::models::Model;
use crate::tools::AgentTool;
use std::sync::Arc;

fn agent(
    role: &str,
    avatar: &str,
    goal: &str,
    backstory: &str,
    tools: Vec<Arc<dyn AgentTool>>,
    model: &Model,
) -> AgentSpec {
    AgentSpec {
        role: role.to_string(),
        goal: goal.to_string(),
        backstory: backstory.to_string(),
        avatar: avatar.to_string(),
        tools,
        delegation_allowed: false,
        model: model.clone(),
    }
}

/// Finds relevant sources through web searches.
pub fn searcher(kind: CrewKind, search: Arc<dyn AgentTool>, model: &Model) -> AgentSpec {
    let goal = match kind {
        CrewKind::TechSage => {
            "Find relevant sources of information through web searches on technology, \
             programming, and cloud architecture."
        }
        CrewKind::Company => "Find relevant sources of information through Google searches.",
    };
    agent(
        "Searcher",
        "🧐",
        goal,
        "An experienced internet researcher with a keen eye for relevant sources. You are \
         adept at finding accurate and useful information from various online sources.",
        vec![search],
        model,
    )
}

/// Extracts the useful content of the sources found by the searcher.
pub fn scraper(scrape: Arc<dyn AgentTool>, model: &Model) -> AgentSpec {
    agent(
        "Scraper",
        "🕷️",
        "Scrape the content of identified websites to extract useful information.",
        "A skilled web scraper with a background in data extraction. You are proficient in \
         parsing and cleaning data to ensure accuracy.",
        vec![scrape],
        model,
    )
}

pub fn content_generator(model: &Model) -> AgentSpec {
    agent(
        "Content Generator",
        "✏️",
        "Generate insightful content based on the latest trends and information.",
        "A creative and knowledgeable content creator who excels at producing engaging and \
         informative articles and reports.",
        vec![],
        model,
    )
}

pub fn validator(model: &Model) -> AgentSpec {
    agent(
        "Validator",
        "🔎",
        "Check the relevancy, accuracy, and coherence of the retrieved data.",
        "A meticulous data analyst who ensures the integrity and accuracy of information. \
         You are thorough in verifying data consistency and completeness.",
        vec![],
        model,
    )
}

/// Agents of a crew, in the order their tasks run.
pub fn roster(
    kind: CrewKind,
    search: Arc<dyn AgentTool>,
    scrape: Arc<dyn AgentTool>,
    model: &Model,
) -> Vec<Arc<AgentSpec>> {
    let last = match kind {
        CrewKind::TechSage => content_generator(model),
        CrewKind::Company => validator(model),
    };
    vec![
        Arc::new(searcher(kind, search, model)),
        Arc::new(scraper(scrape, model)),
        Arc::new(last),
    ]
}
