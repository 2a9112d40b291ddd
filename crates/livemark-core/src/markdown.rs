use pulldown_cmark::{Event, Options, Parser, Tag, TagEnd};

fn options() -> Options {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_TASKLISTS);
    options
}

/// Create a `pulldown-cmark` parser with our default options enabled.
pub fn parser(source: &str) -> Parser<'_> {
    Parser::new_ext(source, options())
}

struct PlainText {
    out: String,
    at_line_start: bool,
}

impl PlainText {
    fn push(&mut self, text: &str) {
        self.out.push_str(text);
        self.at_line_start = false;
    }

    fn break_line(&mut self) {
        if !self.at_line_start {
            self.out.push('\n');
            self.at_line_start = true;
        }
    }
}

/// Render markdown to a simple plain-text representation.
///
/// Used for CLI preview output and for the text content of rendered
/// blocks.
pub fn plain_text(source: &str) -> String {
    let mut writer = PlainText {
        out: String::new(),
        at_line_start: true,
    };

    for event in parser(source) {
        match event {
            Event::Start(Tag::Item) => writer.push("- "),
            Event::Start(Tag::TableCell) => {
                if !writer.at_line_start {
                    writer.out.push('\t');
                }
            }
            Event::Text(text) | Event::Code(text) => writer.push(text.as_ref()),
            Event::SoftBreak | Event::HardBreak => writer.break_line(),
            Event::Rule => {
                writer.break_line();
                writer.push("---");
                writer.break_line();
            }
            Event::End(end) => match end {
                TagEnd::Paragraph
                | TagEnd::Heading { .. }
                | TagEnd::BlockQuote(_)
                | TagEnd::CodeBlock
                | TagEnd::Item
                | TagEnd::List(_)
                | TagEnd::Table
                | TagEnd::TableHead
                | TagEnd::TableRow => writer.break_line(),
                _ => {}
            },
            _ => {}
        }
    }

    writer.out
}
