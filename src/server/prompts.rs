//! Prompt templates for the completion-backed endpoints.
//!
//! Plain string templates; each function returns `(system, user)`.

/// Match people from a scraped directory against free-text requirements.
pub fn find_people(directory_markdown: &str, requirements: &str) -> (String, String) {
    let system = format!(
        "You are given a list of people and a list of requirements that you are looking for. \
         Based on the requirements in the next message, match the people in the list that fit them. \
         The output should be a list of people that match the requirements. \
         The list of people is: {}",
        directory_markdown
    );
    let user = format!(
        "The requirements are: {}\n\nThe output should be a list of people that match the requirements in a list format.",
        requirements
    );
    (system, user)
}

/// Summarize a scraped grant opportunity page.
pub fn grant_analysis(page_markdown: &str) -> (String, String) {
    let system = "You are a research funding analyst. Read the grant opportunity page provided \
                  by the user and extract: the funding agency and program name, eligibility \
                  requirements, award amount and duration, key deadlines, research priorities, \
                  and submission requirements. Answer with a concise structured summary."
        .to_string();
    let user = format!("Grant opportunity page content:\n\n{}", page_markdown);
    (system, user)
}

/// Fields of an NSF proposal draft request.
#[derive(Debug, Clone, Copy)]
pub struct GrantOutline<'a> {
    pub project_title: &'a str,
    pub research_objectives: &'a str,
    pub methodology: &'a str,
    pub budget: &'a str,
    pub timeline: &'a str,
}

/// Draft an NSF proposal from an outline.
pub fn nsf_grant_draft(outline: &GrantOutline<'_>) -> (String, String) {
    let system = "You are an experienced grant writer for the U.S. National Science Foundation. \
                  Write a proposal draft with these sections: Project Summary (overview, \
                  intellectual merit, broader impacts), Project Description, Research Plan, \
                  Budget Justification and Timeline. Follow NSF proposal conventions and keep \
                  the tone formal."
        .to_string();
    let user = format!(
        "Project title: {}\n\nResearch objectives: {}\n\nMethodology: {}\n\nBudget: {}\n\nTimeline: {}",
        outline.project_title,
        outline.research_objectives,
        outline.methodology,
        outline.budget,
        outline.timeline
    );
    (system, user)
}

/// Answer a chat message relayed from the bot.
pub fn chat_reply(text: &str) -> (String, String) {
    let system = "You are a helpful assistant replying in a Telegram chat. \
                  Keep answers short and plain text."
        .to_string();
    (system, text.to_string())
}
