use crate::error::{GenerationError, Result};
use crate::models::GenerationResult;
use printpdf::*;
use std::io::BufWriter;

const PAGE_WIDTH: f32 = 210.0;
const PAGE_HEIGHT: f32 = 297.0;
const TOP: f32 = 275.0;
const BOTTOM: f32 = 20.0;
const LEFT: f32 = 15.0;
const WRAP_COLUMNS: usize = 95;

/// One line of output: text, font size, extra space before it.
struct Line(String, f32, f32);

/// Text-only recipe sheet. Images are counted, not embedded.
pub fn generate_pdf(recipe: &GenerationResult) -> Result<Vec<u8>> {
    let (doc, page, layer) = PdfDocument::new(
        format!("Recipe: {}", truncate(&recipe.document.title, 48)),
        Mm(PAGE_WIDTH),
        Mm(PAGE_HEIGHT),
        "Layer 1",
    );
    let font = doc
        .add_builtin_font(BuiltinFont::Helvetica)
        .map_err(|e| GenerationError::Export(e.to_string()))?;

    let mut current = doc.get_page(page).get_layer(layer);
    let mut y = TOP;
    let mut page_no = 1;
    for Line(text, size, gap) in recipe_lines(recipe) {
        let height = size * 0.5 + gap;
        if y - height < BOTTOM {
            page_no += 1;
            let (page, layer) = doc.add_page(Mm(PAGE_WIDTH), Mm(PAGE_HEIGHT), format!("Page {page_no}"));
            current = doc.get_page(page).get_layer(layer);
            y = TOP;
        }
        y -= height;
        current.use_text(text, size, Mm(LEFT), Mm(y), &font);
    }

    let mut buf: Vec<u8> = Vec::new();
    {
        let mut writer = BufWriter::new(&mut buf);
        doc.save(&mut writer).map_err(|e| GenerationError::Export(e.to_string()))?;
    }
    Ok(buf)
}

fn recipe_lines(recipe: &GenerationResult) -> Vec<Line> {
    let doc = &recipe.document;
    let mut lines = vec![
        Line(truncate(&doc.title, 60), 20.0, 0.0),
        Line(format!("by {} - {}", recipe.persona, recipe.created_at.format("%Y-%m-%d")), 9.0, 2.0),
    ];
    lines.extend(wrap(&doc.description, WRAP_COLUMNS).into_iter().map(|l| Line(l, 11.0, 1.0)));

    if let Some(variant) = &doc.variant {
        lines.push(Line("Variation".into(), 13.0, 6.0));
        for text in [&variant.change_diff, &variant.change_reason] {
            lines.extend(wrap(text, WRAP_COLUMNS).into_iter().map(|l| Line(l, 10.0, 1.0)));
        }
        if !variant.change_categories.is_empty() {
            lines.push(Line(format!("Categories: {}", variant.change_categories.join(", ")), 9.0, 1.0));
        }
    }

    lines.push(Line("Ingredients".into(), 14.0, 8.0));
    for ingredient in &doc.ingredients {
        lines.push(Line(format!("- {} {}", ingredient.name, ingredient.amount), 10.0, 1.5));
    }

    lines.push(Line("Steps".into(), 14.0, 8.0));
    for step in &doc.steps {
        let has_image = recipe.step_images.iter().any(|img| img.ordinal + 1 == step.order as usize);
        let marker = if has_image { " [photo]" } else { "" };
        let wrapped = wrap(&format!("{}. {}{}", step.order, step.instruction, marker), WRAP_COLUMNS);
        for (i, l) in wrapped.into_iter().enumerate() {
            lines.push(Line(l, 10.0, if i == 0 { 2.0 } else { 0.5 }));
        }
    }

    if !doc.hashtags.is_empty() {
        lines.push(Line(format!("#{}", doc.hashtags.join(" #")), 9.0, 8.0));
    }
    lines.push(Line(
        format!(
            "({} cover images, {} step images generated; images not embedded in this export)",
            recipe.cover_images.len(),
            recipe.step_images.len()
        ),
        8.0,
        6.0,
    ));
    lines
}

fn wrap(text: &str, columns: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();
    for word in text.split_whitespace() {
        if !current.is_empty() && current.chars().count() + 1 + word.chars().count() > columns {
            lines.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max { s.to_string() } else { format!("{}…", s.chars().take(max).collect::<String>()) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{GeneratedDocument, Ingredient, Step};
    use chrono::Utc;
    use uuid::Uuid;

    fn recipe(steps: usize) -> GenerationResult {
        GenerationResult {
            id: Uuid::new_v4(),
            persona: "home_cook_emma".into(),
            subject: "Pancakes".into(),
            document: GeneratedDocument {
                title: "Fluffy Buttermilk Pancakes".into(),
                description: "Weekend pancakes. ".repeat(30),
                ingredients: vec![Ingredient { name: "flour".into(), amount: "200g".into() }],
                steps: (1..=steps as u32)
                    .map(|order| Step { order, instruction: format!("Do step {order} carefully and patiently.") })
                    .collect(),
                hashtags: vec!["breakfast".into()],
                variant: None,
            },
            cover_images: vec![],
            step_images: vec![],
            created_at: Utc::now(),
        }
    }

    #[test]
    fn wraps_on_word_boundaries() {
        let lines = wrap("one two three four five", 9);
        assert_eq!(lines, vec!["one two", "three", "four five"]);
        assert!(wrap("   ", 10).is_empty());
    }

    #[test]
    fn truncates_by_chars() {
        assert_eq!(truncate("김치찌개", 2), "김치…");
        assert_eq!(truncate("short", 10), "short");
    }

    #[test]
    fn renders_a_pdf() {
        let bytes = generate_pdf(&recipe(4)).unwrap();
        assert!(bytes.starts_with(b"%PDF"));
    }

    #[test]
    fn long_recipes_spill_onto_more_pages() {
        let short = recipe_lines(&recipe(2));
        let long = recipe_lines(&recipe(80));
        assert!(long.len() > short.len() + 70);
        assert!(generate_pdf(&recipe(80)).unwrap().starts_with(b"%PDF"));
    }
}
