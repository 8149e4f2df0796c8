//! Prompt templates of the tasks and the rendering of a full task prompt.

use super::atomics::{AgentSpec, CrewKind, KickoffInputs, ReasoningRequest, TaskSpec};
use std::collections::HashMap;
use std::sync::Arc;

pub static QUALITY_STANDARD: &str = "high";

static TECHSAGE_GOAL: &str =
    "Retrieve and generate insights on the latest trends in technology, programming, and architecture.";
static COMPANY_GOAL: &str = "Retrieve public info on a given company";
static COMPANY_TOPIC: &str = "Data enrichment";

static TOPIC_SEARCH: &str = r#"Search the web for relevant and recent sources about {topic}. Focus on
official documentation, engineering blogs, conference talks and reputable news sites that explain
the current state, trends and best practices of {topic}.

Guidelines:
- Avoid websites that require login or account creation.
- Prefer primary sources over aggregators.
- Do not use complicated search queries, the best searches are often the simple ones.

Topic: {topic}"#;

static TOPIC_SEARCH_OUTPUT: &str = r#"A list of the top 5 most relevant URLs about {topic}. Each URL
should be accompanied by a brief description of why it is considered trustworthy and relevant."#;

static TOPIC_SCRAPE: &str = r#"Scrape the previously identified websites to extract the key
information about {topic}: main concepts, recent changes, notable tools or projects, practical
recommendations and open problems.

Guidelines:
- Keep only content that is about {topic}.
- Clean the data to remove navigation text, advertisements and duplicates.
- Keep track of the URL each piece of information comes from.

Topic: {topic}"#;

static TOPIC_SCRAPE_OUTPUT: &str = r#"A structured summary of the information extracted from each
website, grouped by source URL, ready to be used to write an article."#;

static TOPIC_GENERATE: &str = r#"Using the information gathered by the previous tasks, write an
insightful article about {topic} for software engineers and architects.

Guidelines:
- Start with a short overview, then cover the latest trends and the practical takeaways.
- Only state facts supported by the gathered information.
- Cite the source URLs at the end.

Topic: {topic}"#;

static TOPIC_GENERATE_OUTPUT: &str = r#"A well structured markdown article about {topic} with an
overview, the key insights, practical recommendations and a list of sources."#;

static COMPANY_SEARCH: &str = r#"Search for relevant websites on Google where we could find accurate and trustworthy information
about {company}. Focus on finding details such as address, phone number, industry
division, number of employees, legal ID, and social network links.

Guidelines:
- Avoid websites that require login such as social networks (e.g., LinkedIn, Facebook), and other
platforms that require account creation (e.g., Crunchbase).
- Prioritize the following sources:
- The company's official website
- Legal and regulatory sources (e.g., Infogreffe, EDGAR Search)
- Wikipedia
- Blogs and reputable news sites
- Ensure that the URLs are talking specifically about the same company {company} and not
about other companies with similar names.
- Do not use complicate google search, the best search are often the simple ones

Company Name: {company}"#;

static COMPANY_SEARCH_OUTPUT: &str = r#"The output should be a list of the top 5 most relevant URLs that could contain useful company
information for {company}. Each URL should be accompanied by a brief description of why
it is considered trustworthy and relevant."#;

static COMPANY_SCRAPE: &str = r#"Scrape the previously identified websites to extract detailed and accurate information
about {company}. The data to be gathered should include, but is not limited to:
- Company name
- Address
- Phone number
- Industry division
- Number of employees
- Legal ID
- Social network links (only publicly available ones, not requiring login)
- Stock information (if applicable)
- Other relevant details that provide insight into the company

Guidelines:
- Ensure the data is parsed and formatted correctly.
- Clean the data to remove any irrelevant or duplicate information.
- Validate the accuracy of the extracted data where possible.
- Store the extracted data in a structured format such as JSON or CSV.

Company Name: {company}"#;

static COMPANY_SCRAPE_OUTPUT: &str = r#"The output should include the following details in a structured format:
- Company name
- Address
- Phone number
- Industry division
- Number of employees
- Legal ID
- Social network links
- Stock information (if applicable)
- Any other relevant details

Ensure the data is well-organized and formatted, ready for further processing or analysis."#;

static COMPANY_VALIDATE: &str = r#"Validate the relevancy, accuracy, and coherence of the data collected for {company}.
The validation process should include the following checks:

- **Weird Data**: Identify and flag any data that appears unusual or out of place, such as unknown
cities, misspelled names, or other anomalies.
- **Inconsistent Data**: Ensure all data points are logically consistent. For example, check for
mismatches like a country listed as France but a city listed as New York, or financial figures that
do not match the number of employees (e.g., 1B revenue but 0 employees).
- **Proper Formatting**: Ensure all data is properly formatted, including well-capitalized names,
no double spaces, no weird characters, and standardized formats for phone numbers, addresses, etc.

Guidelines:
- Remove any data that is flagged as inaccurate or inconsistent.
- Correct minor formatting issues where possible.
- Ensure the final dataset is clean, consistent, and properly formatted.
- The output must be only json, nothing more

Company Name: {company}"#;

static COMPANY_VALIDATE_OUTPUT: &str = r#"The output should be the validated data, cleaned of any inaccuracies, inconsistencies, and improperly
formatted entries. The final dataset should be well-organized and ready for further use. The format
should be a json format."#;

/// Replaces every `{key}` of the template with its value, in a single pass:
/// placeholders inside substituted values are kept as they are.
pub fn fill_prompt(template: &str, values: &HashMap<&str, &str>) -> String {
    let mut filled_prompt = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        filled_prompt.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        let value = after
            .find('}')
            .and_then(|end| values.get(&after[..end]).map(|value| (end, value)));
        match value {
            Some((end, value)) => {
                filled_prompt.push_str(value);
                rest = &after[end + 1..];
            }
            None => {
                filled_prompt.push('{');
                rest = after;
            }
        }
    }
    filled_prompt.push_str(rest);
    filled_prompt
}

pub fn kickoff_inputs(kind: CrewKind, subject: &str) -> KickoffInputs {
    match kind {
        CrewKind::TechSage => KickoffInputs {
            topic: subject.to_string(),
            quality_standard: QUALITY_STANDARD.to_string(),
            goal: TECHSAGE_GOAL.to_string(),
        },
        CrewKind::Company => KickoffInputs {
            topic: COMPANY_TOPIC.to_string(),
            quality_standard: QUALITY_STANDARD.to_string(),
            goal: COMPANY_GOAL.to_string(),
        },
    }
}

fn task(
    name: &str,
    description: &str,
    expected_output: &str,
    values: &HashMap<&str, &str>,
    agent: &Arc<AgentSpec>,
) -> TaskSpec {
    TaskSpec {
        name: name.to_string(),
        description: fill_prompt(description, values),
        expected_output: fill_prompt(expected_output, values),
        agent: agent.clone(),
    }
}

/// Tasks of a crew, one per agent of the roster and in the same order.
pub fn for_crew(kind: CrewKind, subject: &str, agents: &[Arc<AgentSpec>]) -> Vec<TaskSpec> {
    let templates: [(&str, &str, &str); 3] = match kind {
        CrewKind::TechSage => [
            ("search", TOPIC_SEARCH, TOPIC_SEARCH_OUTPUT),
            ("scrape", TOPIC_SCRAPE, TOPIC_SCRAPE_OUTPUT),
            ("generate_content", TOPIC_GENERATE, TOPIC_GENERATE_OUTPUT),
        ],
        CrewKind::Company => [
            ("search", COMPANY_SEARCH, COMPANY_SEARCH_OUTPUT),
            ("scrape", COMPANY_SCRAPE, COMPANY_SCRAPE_OUTPUT),
            ("validate", COMPANY_VALIDATE, COMPANY_VALIDATE_OUTPUT),
        ],
    };
    let values = HashMap::from([("topic", subject), ("company", subject)]);

    templates
        .iter()
        .zip(agents)
        .map(|((name, description, expected), agent)| {
            task(name, description, expected, &values, agent)
        })
        .collect()
}

/// The full prompt an agent receives for a task: who it is, what to do and
/// what the previous tasks produced.
pub fn render_prompt(request: &ReasoningRequest<'_>) -> String {
    let agent = request.agent();
    let mut prompt = format!(
        "You are {role}.\n{backstory}\n\nYour personal goal is: {goal}\n\
         The crew's goal is: {crew_goal}\nQuality standard: {quality}\n\n\
         Current Task: {description}\n\n\
         This is the expected criteria for your final answer: {expected}\n\
         You MUST return the actual complete content as the final answer, not a summary.",
        role = agent.role,
        backstory = agent.backstory,
        goal = agent.goal,
        crew_goal = request.inputs.goal,
        quality = request.inputs.quality_standard,
        description = request.task.description,
        expected = request.task.expected_output,
    );

    if !request.context.is_empty() {
        prompt.push_str("\n\nThis is the context you're working with:\n");
        for output in request.context {
            prompt.push_str(&format!("\n### {} ({})\n{}\n", output.task, output.agent, output.raw));
            if request.options.memory {
                for observation in &output.observations {
                    prompt.push_str(&format!(
                        "\n{} with input {}:\n{}\n",
                        observation.tool, observation.input, observation.output
                    ));
                }
            }
        }
    }
    prompt
}
