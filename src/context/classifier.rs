use crate::language::LanguagePair;

/// Domain returned when no profile scores high enough
pub const GENERAL_DOMAIN: &str = "general";

pub const IT_DOMAIN: &str = "IT";

/// Keyword hits a domain needs before it is chosen over `general`
pub const MIN_DOMAIN_SCORE: usize = 3;

pub const MAX_GLOSSARY_TERMS: usize = 15;

/// Language pair of the term tables
pub const GLOSSARY_SOURCE_LANGUAGE: &str = "en";
pub const GLOSSARY_TARGET_LANGUAGE: &str = "ko";

struct DomainProfile {
    name: &'static str,
    keywords: &'static [&'static str],
    terms: &'static [(&'static str, &'static str)],
}

// Declaration order breaks score ties.
static DOMAINS: &[DomainProfile] = &[
    DomainProfile {
        name: IT_DOMAIN,
        keywords: &[
            "programming", "code", "software", "algorithm", "function",
            "variable", "class", "object", "database", "api", "server",
            "python", "javascript", "html", "css", "git", "deploy",
            "framework", "library", "debug", "compile", "runtime",
            "computer", "memory", "cpu", "data structure", "complexity",
            "priori", "posteriori", "analysis", "asymptotic", "notation",
        ],
        terms: &[
            ("function", "함수"),
            ("variable", "변수"),
            ("class", "클래스"),
            ("object", "객체"),
            ("method", "메서드"),
            ("parameter", "매개변수"),
            ("argument", "인자"),
            ("return", "반환"),
            ("loop", "반복문"),
            ("condition", "조건문"),
            ("array", "배열"),
            ("string", "문자열"),
            ("integer", "정수"),
            ("boolean", "불리언"),
            ("inheritance", "상속"),
            ("interface", "인터페이스"),
            ("module", "모듈"),
            ("package", "패키지"),
            ("library", "라이브러리"),
            ("framework", "프레임워크"),
            ("database", "데이터베이스"),
            ("query", "쿼리"),
            ("server", "서버"),
            ("client", "클라이언트"),
            ("request", "요청"),
            ("response", "응답"),
            ("algorithm", "알고리즘"),
            ("complexity", "복잡도"),
            ("time complexity", "시간 복잡도"),
            ("space complexity", "공간 복잡도"),
            ("priori analysis", "사전 분석"),
            ("posteriori testing", "사후 테스트"),
            ("asymptotic", "점근적"),
            ("notation", "표기법"),
            ("big O", "빅오"),
            ("data structure", "자료구조"),
            ("recursion", "재귀"),
            ("iteration", "반복"),
            ("stack", "스택"),
            ("queue", "큐"),
            ("tree", "트리"),
            ("graph", "그래프"),
            ("sorting", "정렬"),
            ("searching", "탐색"),
        ],
    },
    DomainProfile {
        name: "cooking",
        keywords: &[
            "recipe", "cook", "ingredient", "kitchen", "bake", "fry",
            "boil", "chop", "slice", "sauce", "seasoning", "delicious",
            "taste", "flavor", "dish", "meal", "oven", "pan",
        ],
        terms: &[
            ("recipe", "레시피"),
            ("ingredient", "재료"),
            ("seasoning", "양념"),
            ("sauce", "소스"),
            ("garnish", "가니쉬"),
            ("marinate", "재우다"),
            ("simmer", "끓이다"),
            ("sauté", "볶다"),
        ],
    },
    DomainProfile {
        name: "gaming",
        keywords: &[
            "game", "player", "level", "score", "character", "quest",
            "boss", "weapon", "skill", "multiplayer", "strategy",
            "gameplay", "controller", "fps", "rpg", "mmorpg",
        ],
        terms: &[
            ("level", "레벨"),
            ("character", "캐릭터"),
            ("skill", "스킬"),
            ("quest", "퀘스트"),
            ("boss", "보스"),
            ("item", "아이템"),
            ("damage", "데미지"),
            ("health", "체력"),
        ],
    },
    DomainProfile {
        name: "business",
        keywords: &[
            "business", "market", "investment", "revenue", "profit",
            "strategy", "management", "startup", "entrepreneur",
            "finance", "stock", "economy", "growth", "sales",
        ],
        terms: &[
            ("revenue", "매출"),
            ("profit", "이익"),
            ("investment", "투자"),
            ("market", "시장"),
            ("strategy", "전략"),
            ("growth", "성장"),
        ],
    },
    DomainProfile {
        name: "science",
        keywords: &[
            "science", "research", "experiment", "hypothesis", "theory",
            "data", "analysis", "study", "discovery", "physics",
            "chemistry", "biology", "laboratory", "molecule", "atom",
        ],
        terms: &[
            ("hypothesis", "가설"),
            ("theory", "이론"),
            ("experiment", "실험"),
            ("data", "데이터"),
            ("analysis", "분석"),
            ("result", "결과"),
        ],
    },
    DomainProfile {
        name: "education",
        keywords: &[
            "learn", "teach", "student", "lecture", "course", "lesson",
            "tutorial", "example", "explain", "understand", "concept",
            "study", "practice", "exercise", "homework", "exam",
        ],
        terms: &[
            ("lecture", "강의"),
            ("tutorial", "튜토리얼"),
            ("example", "예시"),
            ("concept", "개념"),
            ("exercise", "연습"),
        ],
    },
    DomainProfile {
        name: "news",
        keywords: &[
            "news", "report", "breaking", "update", "politics",
            "government", "election", "president", "minister",
            "policy", "statement", "official", "announce",
        ],
        terms: &[],
    },
];

fn profile(domain: &str) -> Option<&'static DomainProfile> {
    DOMAINS.iter().find(|p| p.name.eq_ignore_ascii_case(domain.trim()))
}

/// Known domain names in declaration order
pub fn domain_names() -> impl Iterator<Item = &'static str> {
    DOMAINS.iter().map(|p| p.name)
}

/// Highest-scoring domain, or `general` below [`MIN_DOMAIN_SCORE`]
pub fn detect_domain(text: &str) -> String {
    let lowered = text.to_lowercase();

    let mut best: Option<(&DomainProfile, usize)> = None;
    for profile in DOMAINS {
        let score = profile.keywords.iter().filter(|k| lowered.contains(*k)).count();
        if best.is_none_or(|(_, top)| score > top) {
            best = Some((profile, score));
        }
    }

    match best {
        Some((profile, score)) if score >= MIN_DOMAIN_SCORE => profile.name.to_string(),
        _ => GENERAL_DOMAIN.to_string(),
    }
}

/// Glossary entries of `domain` whose source term occurs in `text`.
///
/// Outside the IT domain, IT terms present in the text are folded in after the
/// domain's own. At most [`MAX_GLOSSARY_TERMS`] entries, table order kept.
pub fn extract_terms(text: &str, domain: &str) -> Vec<(String, String)> {
    let lowered = text.to_lowercase();
    let mut glossary: Vec<(String, String)> = Vec::new();

    if let Some(profile) = profile(domain) {
        collect_terms(&lowered, profile.terms, &mut glossary);
    }

    let is_it = domain.trim().eq_ignore_ascii_case(IT_DOMAIN);
    if !is_it {
        if let Some(it) = profile(IT_DOMAIN) {
            collect_terms(&lowered, it.terms, &mut glossary);
        }
    }

    glossary.truncate(MAX_GLOSSARY_TERMS);
    glossary
}

fn collect_terms(lowered: &str, terms: &[(&str, &str)], glossary: &mut Vec<(String, String)>) {
    for (source, target) in terms {
        if lowered.contains(&source.to_lowercase())
            && !glossary.iter().any(|(existing, _)| existing == source)
        {
            glossary.push((source.to_string(), target.to_string()));
        }
    }
}

/// Whether the term tables can be used for `languages`
pub fn glossary_applies(languages: &LanguagePair) -> bool {
    languages.matches(GLOSSARY_SOURCE_LANGUAGE, GLOSSARY_TARGET_LANGUAGE)
}

/// Infer the domain of `text` and its glossary
pub fn classify(text: &str) -> (String, Vec<(String, String)>) {
    let domain = detect_domain(text);
    if domain == GENERAL_DOMAIN {
        return (domain, Vec::new());
    }
    let glossary = extract_terms(text, &domain);
    (domain, glossary)
}
