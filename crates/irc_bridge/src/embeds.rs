//! Rich-embed assembly. The EMBED command accumulates fields into a
//! per-channel builder; END turns the builder into a message.

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Embed {
    pub title: Option<String>,
    pub description: Option<String>,
    pub url: Option<String>,
    pub color: Option<(u8, u8, u8)>,
    pub author: Option<String>,
    pub footer: Option<String>,
    pub image_url: Option<String>,
    pub thumbnail_url: Option<String>,
    pub timestamp: Option<String>,
    pub fields: Vec<EmbedField>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

#[derive(Debug, Clone, Default)]
pub struct EmbedBuilder {
    embed: Embed,
}

impl EmbedBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn title(&mut self, title: String) {
        self.embed.title = Some(title);
    }

    pub fn description(&mut self, description: String) {
        self.embed.description = Some(description);
    }

    pub fn url(&mut self, url: String) {
        self.embed.url = Some(url);
    }

    /// Accepts `R G B` components, each 0-255.
    pub fn color(&mut self, r: u8, g: u8, b: u8) {
        self.embed.color = Some((r, g, b));
    }

    pub fn author(&mut self, author: String) {
        self.embed.author = Some(author);
    }

    pub fn footer(&mut self, footer: String) {
        self.embed.footer = Some(footer);
    }

    pub fn image(&mut self, url: String) {
        self.embed.image_url = Some(url);
    }

    pub fn thumbnail(&mut self, url: String) {
        self.embed.thumbnail_url = Some(url);
    }

    pub fn timestamp(&mut self, ts: String) {
        self.embed.timestamp = Some(ts);
    }

    pub fn field(&mut self, name: String, value: String, inline: bool) {
        self.embed.fields.push(EmbedField { name, value, inline });
    }

    pub fn build(self) -> Embed {
        self.embed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_accumulates() {
        let mut b = EmbedBuilder::new();
        b.title("Release".to_owned());
        b.color(255, 0, 128);
        b.field("version".to_owned(), "1.0".to_owned(), true);
        b.field("notes".to_owned(), "none".to_owned(), false);

        let embed = b.build();
        assert_eq!(embed.title.as_deref(), Some("Release"));
        assert_eq!(embed.color, Some((255, 0, 128)));
        assert_eq!(embed.fields.len(), 2);
        assert!(embed.fields[0].inline);
        assert!(embed.description.is_none());
    }
}
