mod link;

pub use link::{
    CreateLinkRequest, CreateLinkResponse, Link, LinkAnalytics, LinkSummary, Visit, VisitContext,
};
