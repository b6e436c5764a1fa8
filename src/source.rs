use jiff::Timestamp;

const HOMECARE_URL: &str = concat!(
    "https://www.cqc.org.uk/search/all?query=&location-query=&radius=",
    "&display=csv&sort=relevance&last-published=week",
    "&filters[]=archived:active",
    "&filters[]=lastPublished:all",
    "&filters[]=more_services:all",
    "&filters[]=overallRating:Not%20rated",
    "&filters[]=overallRating:Inadequate",
    "&filters[]=overallRating:Requires%20improvement",
    "&filters[]=services:homecare-agencies",
    "&filters[]=specialisms:all",
);

const CAREHOMES_URL: &str = concat!(
    "https://www.cqc.org.uk/search/all?query=&location-query=&radius=",
    "&display=csv&sort=relevance&last-published=week",
    "&filters[]=archived:active",
    "&filters[]=careHomes:all",
    "&filters[]=lastPublished:all",
    "&filters[]=more_services:all",
    "&filters[]=overallRating:Not%20rated",
    "&filters[]=overallRating:Inadequate",
    "&filters[]=overallRating:Requires%20improvement",
    "&filters[]=services:care-home",
    "&filters[]=specialisms:all",
);

/// Every stored export starts with this prefix.
pub const FILE_PREFIX: &str = "cqc_";
pub const FILE_EXTENSION: &str = ".csv";

/// One of the CSV exports published by the CQC search page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Source {
    pub name: String,
    pub url: String,
}

impl Source {
    pub fn new(name: &str, url: &str) -> Source {
        Source {
            name: name.trim().replace(' ', "").to_lowercase(),
            url: url.to_string(),
        }
    }

    /// Home care agencies rated Not rated, Inadequate or Requires improvement,
    /// published in the last week.
    pub fn homecare() -> Source {
        Source::new("homecare", HOMECARE_URL)
    }

    /// Care homes with the same rating filters as [`Source::homecare`].
    pub fn carehomes() -> Source {
        Source::new("carehomes", CAREHOMES_URL)
    }

    pub fn defaults() -> Vec<Source> {
        vec![Source::homecare(), Source::carehomes()]
    }

    /// Name of the file a download started at `at` is saved under, e.g.
    /// `cqc_homecare_20261016_073005Z.csv`.  Does not check if the file exists.
    pub fn file_name(&self, at: Timestamp) -> String {
        format!(
            "{}{}_{}{}",
            FILE_PREFIX,
            self.name,
            at.strftime("%Y%m%d_%H%M%SZ"),
            FILE_EXTENSION
        )
    }
}

/// Is this the name of a file produced by a download?
pub fn is_stored_file_name(name: &str) -> bool {
    name.len() > FILE_PREFIX.len() + FILE_EXTENSION.len()
        && name.starts_with(FILE_PREFIX)
        && name.ends_with(FILE_EXTENSION)
}
