use chrono::{DateTime, Months, NaiveDate, Utc};
use sea_orm::sea_query::{Expr, SelectStatement};
use sea_orm::{
    ColumnTrait, Condition, DbConn, DbErr, EntityTrait, JoinType, QueryFilter, QueryOrder,
    QuerySelect, QueryTrait, RelationTrait,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::db::entities::{image, image_tag, tag};
use crate::db::services::image_service::{ImageWithTags, load_tags};

/// Structured filter over a user's library. Every part is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImageFilter {
    /// Image must carry all of these tags.
    pub tags: Vec<String>,
    /// `YYYY-MM`, matched against the capture time.
    pub month: Option<String>,
    /// Substring of the camera make.
    pub camera: Option<String>,
    /// Image must carry a tag whose name contains any of these.
    pub keywords: Vec<String>,
}

impl ImageFilter {
    fn normalized(values: &[String]) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for value in values {
            let value = value.trim();
            if !value.is_empty() && !out.iter().any(|v| v == value) {
                out.push(value.to_string());
            }
        }
        out
    }

    pub fn is_empty(&self) -> bool {
        Self::normalized(&self.tags).is_empty()
            && Self::normalized(&self.keywords).is_empty()
            && self.month_range().is_none()
            && self.camera_filter().is_none()
    }

    fn camera_filter(&self) -> Option<&str> {
        self.camera.as_deref().map(str::trim).filter(|c| !c.is_empty())
    }

    /// The capture-time window for `month`, if it parses.
    pub fn month_range(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        self.month.as_deref().and_then(month_range)
    }
}

/// Half-open UTC range `[first of month, first of next month)` for `YYYY-MM`.
pub fn month_range(month: &str) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
    let month = month.trim();
    if month.len() != 7 || month.as_bytes()[4] != b'-' {
        return None;
    }
    let start = NaiveDate::parse_from_str(&format!("{month}-01"), "%Y-%m-%d").ok()?;
    let end = start.checked_add_months(Months::new(1))?;
    Some((
        start.and_hms_opt(0, 0, 0)?.and_utc(),
        end.and_hms_opt(0, 0, 0)?.and_utc(),
    ))
}

/// Ids of images that carry every one of `tags`.
fn images_with_all_tags(tags: &[String]) -> SelectStatement {
    image_tag::Entity::find()
        .select_only()
        .column(image_tag::Column::ImageId)
        .join(JoinType::InnerJoin, image_tag::Relation::Tag.def())
        .filter(tag::Column::Name.is_in(tags.iter().cloned()))
        .group_by(image_tag::Column::ImageId)
        .having(
            Expr::expr(Expr::col((tag::Entity, tag::Column::Id)).count_distinct())
                .gte(tags.len() as i64),
        )
        .into_query()
}

/// Ids of images with at least one tag whose name contains any keyword.
fn images_matching_keywords(keywords: &[String]) -> SelectStatement {
    let any_keyword = keywords
        .iter()
        .fold(Condition::any(), |cond, kw| cond.add(tag::Column::Name.contains(kw)));
    image_tag::Entity::find()
        .select_only()
        .column(image_tag::Column::ImageId)
        .join(JoinType::InnerJoin, image_tag::Relation::Tag.def())
        .filter(any_keyword)
        .distinct()
        .into_query()
}

/// Runs `filter` over the user's images, newest first, with tags loaded.
///
/// When both tags and keywords are given an image qualifies through either
/// the tag intersection or a keyword match.
pub async fn query_images(
    db: &DbConn,
    user_id: i32,
    filter: &ImageFilter,
) -> Result<Vec<ImageWithTags>, DbErr> {
    let mut query = image::Entity::find().filter(image::Column::UserId.eq(user_id));

    let tags = ImageFilter::normalized(&filter.tags);
    let keywords = ImageFilter::normalized(&filter.keywords);
    let mut tag_condition = Condition::any();
    if !tags.is_empty() {
        tag_condition = tag_condition.add(image::Column::Id.in_subquery(images_with_all_tags(&tags)));
    }
    if !keywords.is_empty() {
        tag_condition =
            tag_condition.add(image::Column::Id.in_subquery(images_matching_keywords(&keywords)));
    }
    if !tags.is_empty() || !keywords.is_empty() {
        query = query.filter(tag_condition);
    }

    match (filter.month.as_deref(), filter.month_range()) {
        (_, Some((start, end))) => {
            query = query
                .filter(image::Column::TakenAt.gte(start))
                .filter(image::Column::TakenAt.lt(end));
        }
        (Some(month), None) => debug!(month, "Ignoring unparsable month filter."),
        (None, None) => {}
    }

    if let Some(camera) = filter.camera_filter() {
        query = query.filter(image::Column::CameraMake.contains(camera));
    }

    let images = query
        .order_by_desc(image::Column::CreatedAt)
        .order_by_desc(image::Column::Id)
        .all(db)
        .await?;
    load_tags(db, images).await
}
