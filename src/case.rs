//! Naming helpers: entity base names, table names, tags and component names.

use sha2::{Digest, Sha256};

/// Last segment of an entity type name: `App\Models\BlogPost`, `blog::BlogPost` and `blog.BlogPost` all give `BlogPost`.
pub fn base_name(entity: &str) -> &str {
    entity
        .rsplit(|c: char| c == '\\' || c == ':' || c == '.' || c == '/')
        .find(|s| !s.is_empty())
        .unwrap_or(entity)
}

/// `BlogPost` -> `blog_post`.
pub fn to_snake_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 4);
    let mut prev_lower = false;
    for c in s.chars() {
        if c.is_uppercase() {
            if prev_lower {
                out.push('_');
            }
            out.extend(c.to_lowercase());
            prev_lower = false;
        } else if c == '-' || c == ' ' {
            out.push('_');
            prev_lower = false;
        } else {
            out.push(c);
            prev_lower = c.is_lowercase() || c.is_ascii_digit();
        }
    }
    out
}

/// Naive English plural: `post` -> `posts`, `category` -> `categories`, `box` -> `boxes`.
/// Words already ending in a single `s` are left alone.
pub fn pluralize(word: &str) -> String {
    let lower = word.to_lowercase();
    if lower.ends_with('s') && !lower.ends_with("ss") {
        return word.to_string();
    }
    if lower.ends_with("ss") || lower.ends_with('x') || lower.ends_with('z') || lower.ends_with("ch") || lower.ends_with("sh") {
        return format!("{}es", word);
    }
    if let Some(stem) = word.strip_suffix('y') {
        let before = stem.chars().last();
        if before.is_some_and(|c| !"aeiouAEIOU".contains(c)) {
            return format!("{}ies", stem);
        }
    }
    format!("{}s", word)
}

/// `blog_posts` -> `Blog Posts`.
pub fn title_case(s: &str) -> String {
    to_snake_case(s)
        .split('_')
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Default table for an entity type: snake-cased plural of the base name.
pub fn default_table(entity: &str) -> String {
    pluralize(&to_snake_case(base_name(entity)))
}

/// Entity name with every non-alphanumeric character removed.
pub fn strip_non_alphanumeric(s: &str) -> String {
    s.chars().filter(|c| c.is_ascii_alphanumeric()).collect()
}

/// First eight hex digits of the entity's sha256; routes and names gates whose base name is taken.
pub fn short_hash(input: &str) -> String {
    hex::encode(Sha256::digest(input.as_bytes()))[..8].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_names() {
        assert_eq!(base_name("App\\Models\\BlogPost"), "BlogPost");
        assert_eq!(base_name("blog::Post"), "Post");
        assert_eq!(base_name("Post"), "Post");
    }

    #[test]
    fn tables_and_titles() {
        assert_eq!(default_table("App\\Models\\BlogPost"), "blog_posts");
        assert_eq!(default_table("Category"), "categories");
        assert_eq!(pluralize("box"), "boxes");
        assert_eq!(pluralize("day"), "days");
        assert_eq!(pluralize("posts"), "posts");
        assert_eq!(pluralize("class"), "classes");
        assert_eq!(title_case("blog_posts"), "Blog Posts");
        assert_eq!(title_case("BlogPost"), "Blog Post");
    }
}
