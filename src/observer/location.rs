use anyhow::{Context, Result};
use url::Url;

/// Where a page currently is. The domain is the hostname of the URL, empty for URLs that have
/// none, e.g. `file:///tmp/index.html`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageLocation {
    pub url: String,
    pub domain: String,
    pub title: Option<String>,
}

impl PageLocation {
    pub fn parse(href: &str) -> Result<Self> {
        let url = Url::parse(href).with_context(|| format!("Invalid page url {href}"))?;
        Ok(Self {
            domain: url.host_str().unwrap_or_default().to_string(),
            url: url.into(),
            title: None,
        })
    }

    pub fn with_title(self, title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ..self
        }
    }
}

#[cfg(test)]
mod tests {
    use super::PageLocation;

    #[test]
    fn domain_is_the_hostname() {
        let location = PageLocation::parse("https://www.example.com:8443/a/b?c=d#e").unwrap();
        assert_eq!(location.domain, "www.example.com");
        assert_eq!(location.url, "https://www.example.com:8443/a/b?c=d#e");
    }

    #[test]
    fn file_urls_have_an_empty_domain() {
        let location = PageLocation::parse("file:///tmp/index.html").unwrap();
        assert_eq!(location.domain, "");
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(PageLocation::parse("not a url").is_err());
    }
}
