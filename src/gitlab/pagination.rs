use reqwest::header::HeaderMap;
use serde_json::Value;
use url::Url;

/// Opaque continuation for a paginated listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageToken(Url);

impl PageToken {
    pub fn url(&self) -> &Url {
        &self.0
    }
}

/// One page of a listing as returned by the API.
#[derive(Debug, Clone, Default)]
pub struct Page {
    pub records: Vec<Value>,
    pub next: Option<PageToken>,
}

/// Finds the continuation of `current`.
///
/// The `Link` header's `rel="next"` target wins. Instances that only send
/// `X-Next-Page` get the `page` query parameter of `current` rewritten.
pub fn next_page_token(headers: &HeaderMap, current: &Url) -> Option<PageToken> {
    if let Some(next) = headers
        .get_all(reqwest::header::LINK)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .find_map(next_link)
    {
        return current.join(&next).ok().map(PageToken);
    }

    let page = headers
        .get("x-next-page")
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|page| !page.is_empty())?;

    let mut url = current.clone();
    let retained: Vec<(String, String)> = current
        .query_pairs()
        .filter(|(key, _)| key != "page")
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();
    url.query_pairs_mut()
        .clear()
        .extend_pairs(retained)
        .append_pair("page", page);
    Some(PageToken(url))
}

fn next_link(header: &str) -> Option<String> {
    header.split(',').find_map(|entry| {
        let mut parts = entry.split(';');
        let target = parts.next()?.trim();
        let is_next = parts.any(|param| {
            let param = param.trim();
            param == "rel=\"next\"" || param == "rel=next"
        });
        if !is_next {
            return None;
        }
        target
            .strip_prefix('<')
            .and_then(|t| t.strip_suffix('>'))
            .map(str::to_string)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    fn current() -> Url {
        Url::parse("https://gitlab.example.com/api/v4/projects/1/pipelines?per_page=2&page=1")
            .unwrap()
    }

    #[test]
    fn link_header_next_relation_is_followed() {
        let mut headers = HeaderMap::new();
        headers.insert(
            reqwest::header::LINK,
            HeaderValue::from_static(
                "<https://gitlab.example.com/api/v4/projects/1/pipelines?page=2&per_page=2>; rel=\"next\", \
                 <https://gitlab.example.com/api/v4/projects/1/pipelines?page=5&per_page=2>; rel=\"last\"",
            ),
        );

        let token = next_page_token(&headers, &current()).unwrap();
        assert_eq!(
            token.url().as_str(),
            "https://gitlab.example.com/api/v4/projects/1/pipelines?page=2&per_page=2"
        );
    }

    #[test]
    fn link_header_without_next_ends_the_listing() {
        let mut headers = HeaderMap::new();
        headers.insert(
            reqwest::header::LINK,
            HeaderValue::from_static(
                "<https://gitlab.example.com/api/v4/projects/1/pipelines?page=1>; rel=\"first\"",
            ),
        );
        assert!(next_page_token(&headers, &current()).is_none());
    }

    #[test]
    fn x_next_page_rewrites_page_parameter() {
        let mut headers = HeaderMap::new();
        headers.insert("x-next-page", HeaderValue::from_static("3"));

        let token = next_page_token(&headers, &current()).unwrap();
        let pairs: Vec<(String, String)> = token
            .url()
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        assert_eq!(
            pairs,
            vec![
                ("per_page".to_string(), "2".to_string()),
                ("page".to_string(), "3".to_string()),
            ]
        );
    }

    #[test]
    fn empty_x_next_page_ends_the_listing() {
        let mut headers = HeaderMap::new();
        headers.insert("x-next-page", HeaderValue::from_static(""));
        assert!(next_page_token(&headers, &current()).is_none());
    }
}
