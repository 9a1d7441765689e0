use super::SynthesisRequest;

/// Context longer than this is cut before being sent to the model.
const MAX_SCRAPED_CHARS: usize = 6000;

pub const SYSTEM_PROMPT: &str = r#"You are the content lead of a professional training organisation.
From one topic you write a blog article and its adaptations for four social networks, consistent in facts and tone.

Answer with ONE JSON object and nothing else, with exactly these keys:
{
  "article": {
    "title": string,
    "excerpt": string (max 160 characters),
    "content": string (HTML using <h2>, <p>, <ul>, <li>, <strong>; 800 to 1200 words),
    "seo_title": string (max 60 characters),
    "seo_description": string (max 155 characters),
    "seo_keywords": [string]
  },
  "linkedin": {
    "caption": string,
    "hashtags": [string],
    "slides": [slide] (6 to 8 slides)
  },
  "instagram": {
    "caption": string,
    "hashtags": [string],
    "slides": [slide] (5 to 7 slides)
  },
  "tiktok": {
    "caption": string,
    "hashtags": [string],
    "video_script": {
      "hook": string,
      "scenes": [{"timing": string, "visual": string, "voiceover": string, "text_overlay": string}],
      "music_suggestion": string,
      "total_duration": string,
      "call_to_action": string
    },
    "slides": [slide]
  },
  "twitter": {
    "tweets": [string] (4 to 7 tweets, each under 280 characters),
    "hashtags": [string]
  }
}

A slide is one of:
  {"type": "cover", "title": string, "subtitle": string}
  {"type": "content", "title": string, "body": string}
  {"type": "stat", "value": string, "label": string, "source": string}
  {"type": "fact", "title": string, "body": string}
  {"type": "tips", "title": string, "tips": [string]}
  {"type": "solution", "title": string, "body": string}
  {"type": "result", "title": string, "body": string}
  {"type": "cta", "title": string, "body": string}
Every carousel starts with a cover slide and ends with a cta slide.
Never invent statistics: only use figures present in the context."#;

pub fn build_user_prompt(request: &SynthesisRequest<'_>) -> String {
    let mut prompt = format!(
        "Topic: {}\n\nWhy it matters now:\n{}\n",
        request.topic,
        request.context.trim()
    );

    let scraped = request.scraped.trim();
    if !scraped.is_empty() {
        prompt.push_str("\nRecent web sources:\n");
        prompt.push_str(crate::utils::truncate_chars(scraped, MAX_SCRAPED_CHARS));
        prompt.push('\n');
    }

    prompt.push_str(&format!(
        "\nTone: {}\nLanguage: write every text in the language with code \"{}\".\n",
        request.tone, request.language
    ));

    let forbidden = request
        .forbidden_words
        .iter()
        .map(|word| word.trim())
        .filter(|word| !word.is_empty())
        .collect::<Vec<_>>();
    if !forbidden.is_empty() {
        prompt.push_str(&format!(
            "Never use these words or expressions: {}.\n",
            forbidden.join(", ")
        ));
    }

    prompt
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_prompt_skips_empty_sections() {
        let request = SynthesisRequest {
            topic: "Qualiopi",
            context: "Audit renforcé",
            scraped: "  ",
            tone: "pédagogique",
            language: "fr",
            forbidden_words: &[" ".to_string()],
        };

        let prompt = build_user_prompt(&request);

        assert!(prompt.starts_with("Topic: Qualiopi"));
        assert!(prompt.contains("Tone: pédagogique"));
        assert!(!prompt.contains("Recent web sources"));
        assert!(!prompt.contains("Never use"));
    }

    #[test]
    fn test_user_prompt_lists_forbidden_words() {
        let forbidden = vec!["gratuit".to_string(), "garanti".to_string()];
        let request = SynthesisRequest {
            topic: "CPF",
            context: "",
            scraped: "### Source\nTexte",
            tone: "neutre",
            language: "fr",
            forbidden_words: &forbidden,
        };

        let prompt = build_user_prompt(&request);

        assert!(prompt.contains("Recent web sources:\n### Source"));
        assert!(prompt.contains("Never use these words or expressions: gratuit, garanti."));
    }
}
