use std::sync::atomic::{AtomicU64, Ordering};

static LAST_SUFFIX_MILLIS: AtomicU64 = AtomicU64::new(0);

/// Article slug: the slugified title plus a base36 millisecond suffix.
///
/// The suffix never repeats within a process, there is no check against
/// slugs already stored.
#[must_use]
pub fn generate_slug(title: &str) -> String {
    let now_millis = u64::try_from(chrono::Utc::now().timestamp_millis())
        .unwrap_or_default();
    let suffix = to_base36(next_suffix_millis(now_millis));

    let base = slugify(title);
    if base.is_empty() {
        format!("article-{suffix}")
    } else {
        format!("{base}-{suffix}")
    }
}

/// Lowercase, fold Latin diacritics to ASCII and collapse every run of
/// other characters into one hyphen.
#[must_use]
pub fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut pending_hyphen = false;
    let mut buf = [0u8; 4];

    for c in title.chars().flat_map(char::to_lowercase) {
        let piece: &str = match fold_diacritic(c) {
            Some(folded) => folded,
            None if c.is_ascii_alphanumeric() => &*c.encode_utf8(&mut buf),
            None => {
                pending_hyphen = true;
                continue;
            }
        };

        if pending_hyphen && !slug.is_empty() {
            slug.push('-');
        }
        pending_hyphen = false;
        slug.push_str(piece);
    }

    slug
}

fn next_suffix_millis(now_millis: u64) -> u64 {
    let previous = LAST_SUFFIX_MILLIS
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
            Some(now_millis.max(last + 1))
        })
        .unwrap_or_else(|last| last);

    now_millis.max(previous + 1)
}

fn to_base36(mut value: u64) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

    if value == 0 {
        return "0".to_string();
    }

    let mut digits = Vec::new();
    while value > 0 {
        digits.push(DIGITS[(value % 36) as usize]);
        value /= 36;
    }
    digits.reverse();

    String::from_utf8(digits).unwrap_or_default()
}

const fn fold_diacritic(c: char) -> Option<&'static str> {
    Some(match c {
        'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' | 'ā' | 'ă' | 'ą' => "a",
        'æ' => "ae",
        'ç' | 'ć' | 'č' => "c",
        'ď' | 'đ' => "d",
        'è' | 'é' | 'ê' | 'ë' | 'ē' | 'ė' | 'ę' | 'ě' => "e",
        'ì' | 'í' | 'î' | 'ï' | 'ī' | 'į' => "i",
        'ł' => "l",
        'ñ' | 'ń' | 'ň' => "n",
        'ò' | 'ó' | 'ô' | 'õ' | 'ö' | 'ø' | 'ō' | 'ő' => "o",
        'œ' => "oe",
        'ŕ' | 'ř' => "r",
        'ś' | 'š' | 'ş' => "s",
        'ß' => "ss",
        'ť' | 'ţ' => "t",
        'ù' | 'ú' | 'û' | 'ü' | 'ū' | 'ů' | 'ű' => "u",
        'ý' | 'ÿ' => "y",
        'ź' | 'ż' | 'ž' => "z",
        _ => return None,
    })
}
