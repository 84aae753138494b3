//! Connector for `templateId = http.jira`: pulls issues via Jira's REST
//! search API and maps them into `cdm.work.item` rows (spec §8 scenario 6).

pub mod connector;
pub mod mapper;

pub use connector::JiraConnector;
pub use mapper::JiraIssueMapper;
