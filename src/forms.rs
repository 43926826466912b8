//! Submitted forms and their field-level validation.
//!
//! Every `clean*` method either returns the value ready for the repository
//! or an `ApiError::Validation` listing every failing field at once.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use utoipa::ToSchema;

use crate::error::{ApiError, FieldErrors};
use crate::models::{Id, NewCategory, NewLocation, NewPost, ProfileUpdate, UpdateCategory, UpdateLocation, UpdatePost};
use crate::repo::{Repo, RepoError};

pub const MAX_CHAR_FIELD_LENGTH: usize = 256;
pub const MAX_NAME_LENGTH: usize = 150;
pub const MAX_SLUG_LENGTH: usize = 50;
pub const MAX_EMAIL_LENGTH: usize = 254;
pub const MIN_PASSWORD_LENGTH: usize = 8;

const REQUIRED: &str = "This field is required.";
const INVALID_CHOICE: &str = "Select a valid choice. That choice is not one of the available choices.";

fn push(errors: &mut FieldErrors, field: &str, message: impl Into<String>) {
    errors.entry(field.to_string()).or_default().push(message.into());
}

fn check_len(errors: &mut FieldErrors, field: &str, value: &str, max: usize) {
    let n = value.chars().count();
    if n > max {
        push(errors, field, format!("Ensure this value has at most {max} characters (it has {n})."));
    }
}

/// Present and non-blank.
fn check_required(errors: &mut FieldErrors, field: &str, value: Option<&str>) {
    if value.map_or(true, |v| v.trim().is_empty()) {
        push(errors, field, REQUIRED);
    }
}

fn finish<T: Serialize>(errors: FieldErrors, form: &T) -> Result<(), ApiError> {
    if errors.is_empty() {
        Ok(())
    } else {
        Err(ApiError::Validation { errors, form: serde_json::to_value(form).unwrap_or_default() })
    }
}

fn is_valid_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => !local.is_empty() && domain.contains('.') && !domain.starts_with('.') && !domain.ends_with('.'),
        None => false,
    }
}

fn is_valid_slug(slug: &str) -> bool {
    !slug.is_empty() && slug.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

fn check_slug(errors: &mut FieldErrors, slug: &str) {
    if !is_valid_slug(slug) {
        push(errors, "slug", "Enter a valid slug consisting of letters, numbers, underscores or hyphens.");
    }
    check_len(errors, "slug", slug, MAX_SLUG_LENGTH);
}

fn is_valid_username(username: &str) -> bool {
    !username.is_empty() && username.chars().all(|c| c.is_alphanumeric() || "@.+-_".contains(c))
}

/// Look up an optional foreign key; a dangling id is a field error, other
/// repository failures propagate.
async fn check_choice<F, Fut, T>(errors: &mut FieldErrors, field: &str, id: Option<Id>, lookup: F) -> Result<(), ApiError>
where
    F: FnOnce(Id) -> Fut,
    Fut: std::future::Future<Output = Result<T, RepoError>>,
{
    if let Some(id) = id {
        match lookup(id).await {
            Ok(_) => {}
            Err(RepoError::NotFound) => push(errors, field, INVALID_CHOICE),
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

/// Tells an explicit `null` (`Some(None)`) apart from an absent field
/// (`None`, through `#[serde(default)]`).
fn explicit_null<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct PostForm {
    pub title: Option<String>,
    pub text: Option<String>,
    /// A future date schedules the post.
    pub pub_date: Option<DateTime<Utc>>,
    pub category: Option<Id>,
    /// `null` removes the location.
    #[serde(default, deserialize_with = "explicit_null")]
    #[schema(value_type = Option<i64>)]
    pub location: Option<Option<Id>>,
    /// Hash returned by the media upload endpoint; `null` removes the image.
    #[serde(default, deserialize_with = "explicit_null")]
    #[schema(value_type = Option<String>)]
    pub image: Option<Option<String>>,
    pub is_published: Option<bool>,
}

impl PostForm {
    fn check_shape(&self, errors: &mut FieldErrors) {
        if let Some(title) = &self.title {
            check_len(errors, "title", title, MAX_CHAR_FIELD_LENGTH);
        }
        if let Some(Some(image)) = &self.image {
            if image.len() != 64 || !image.chars().all(|c| c.is_ascii_hexdigit()) {
                push(errors, "image", "Upload a valid image.");
            }
        }
    }

    async fn check_choices(&self, repo: &dyn Repo, errors: &mut FieldErrors) -> Result<(), ApiError> {
        check_choice(errors, "category", self.category, |id| repo.get_category(id)).await?;
        check_choice(errors, "location", self.location.flatten(), |id| repo.get_location(id)).await
    }

    /// Full form: title, text, publication date and category are required.
    pub async fn clean(self, author_id: Id, repo: &dyn Repo) -> Result<NewPost, ApiError> {
        let mut errors = FieldErrors::new();
        check_required(&mut errors, "title", self.title.as_deref());
        check_required(&mut errors, "text", self.text.as_deref());
        if self.pub_date.is_none() {
            push(&mut errors, "pub_date", REQUIRED);
        }
        if self.category.is_none() {
            push(&mut errors, "category", REQUIRED);
        }
        self.check_shape(&mut errors);
        self.check_choices(repo, &mut errors).await?;
        finish(errors, &self)?;
        Ok(NewPost {
            title: self.title.unwrap_or_default(),
            text: self.text.unwrap_or_default(),
            pub_date: self.pub_date.unwrap_or_else(Utc::now),
            image: self.image.flatten(),
            is_published: self.is_published.unwrap_or(true),
            author_id,
            category_id: self.category,
            location_id: self.location.flatten(),
        })
    }

    /// Partial form: absent fields keep their stored values, supplied ones
    /// are held to the same rules as on creation.
    pub async fn clean_update(self, repo: &dyn Repo) -> Result<UpdatePost, ApiError> {
        let mut errors = FieldErrors::new();
        if self.title.is_some() {
            check_required(&mut errors, "title", self.title.as_deref());
        }
        if self.text.is_some() {
            check_required(&mut errors, "text", self.text.as_deref());
        }
        self.check_shape(&mut errors);
        self.check_choices(repo, &mut errors).await?;
        finish(errors, &self)?;
        Ok(UpdatePost {
            title: self.title,
            text: self.text,
            pub_date: self.pub_date,
            image: self.image,
            is_published: self.is_published,
            category_id: self.category,
            location_id: self.location,
        })
    }
}

/// Any other field in the payload (a post id, say) is ignored.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct CommentForm {
    pub text: Option<String>,
}

impl CommentForm {
    pub fn clean(self) -> Result<String, ApiError> {
        let mut errors = FieldErrors::new();
        check_required(&mut errors, "text", self.text.as_deref());
        finish(errors, &self)?;
        Ok(self.text.unwrap_or_default())
    }
}

/// Only these identity fields are editable, and only on one's own record.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct ProfileForm {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
}

impl ProfileForm {
    pub fn clean(self) -> Result<ProfileUpdate, ApiError> {
        let mut errors = FieldErrors::new();
        if let Some(v) = &self.first_name {
            check_len(&mut errors, "first_name", v, MAX_NAME_LENGTH);
        }
        if let Some(v) = &self.last_name {
            check_len(&mut errors, "last_name", v, MAX_NAME_LENGTH);
        }
        if let Some(email) = &self.email {
            // blank clears the address
            if !email.is_empty() && !is_valid_email(email) {
                push(&mut errors, "email", "Enter a valid email address.");
            }
            check_len(&mut errors, "email", email, MAX_EMAIL_LENGTH);
        }
        finish(errors, &self)?;
        Ok(ProfileUpdate { first_name: self.first_name, last_name: self.last_name, email: self.email })
    }
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct RegistrationForm {
    pub username: Option<String>,
    pub password1: Option<String>,
    pub password2: Option<String>,
}

/// Registration data that passed validation.
#[derive(Debug, Clone)]
pub struct CleanRegistration {
    pub username: String,
    pub password: String,
}

impl RegistrationForm {
    /// Never echoes the passwords back.
    pub fn redisplay(&self) -> serde_json::Value {
        serde_json::json!({ "username": self.username })
    }

    pub fn clean(self) -> Result<CleanRegistration, ApiError> {
        let mut errors = FieldErrors::new();
        let username = self.username.clone().unwrap_or_default();
        let password1 = self.password1.clone().unwrap_or_default();
        let password2 = self.password2.clone().unwrap_or_default();

        if username.is_empty() {
            push(&mut errors, "username", REQUIRED);
        } else {
            check_len(&mut errors, "username", &username, MAX_NAME_LENGTH);
            if !is_valid_username(&username) {
                push(
                    &mut errors,
                    "username",
                    "Enter a valid username. This value may contain only letters, numbers, and @/./+/-/_ characters.",
                );
            }
        }
        if password1.is_empty() {
            push(&mut errors, "password1", REQUIRED);
        } else {
            if password1.chars().count() < MIN_PASSWORD_LENGTH {
                push(
                    &mut errors,
                    "password1",
                    format!("This password is too short. It must contain at least {MIN_PASSWORD_LENGTH} characters."),
                );
            }
            if password1.chars().all(|c| c.is_ascii_digit()) {
                push(&mut errors, "password1", "This password is entirely numeric.");
            }
        }
        if password2.is_empty() {
            push(&mut errors, "password2", REQUIRED);
        } else if password1 != password2 {
            push(&mut errors, "password2", "The two password fields didn't match.");
        }

        if !errors.is_empty() {
            return Err(ApiError::Validation { errors, form: self.redisplay() });
        }
        Ok(CleanRegistration { username, password: password1 })
    }
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct LoginForm {
    pub username: String,
    pub password: String,
}

impl NewCategory {
    pub fn clean(self) -> Result<NewCategory, ApiError> {
        let mut errors = FieldErrors::new();
        check_required(&mut errors, "title", Some(self.title.as_str()));
        check_len(&mut errors, "title", &self.title, MAX_CHAR_FIELD_LENGTH);
        check_required(&mut errors, "description", Some(self.description.as_str()));
        check_slug(&mut errors, &self.slug);
        finish(errors, &self)?;
        Ok(self)
    }
}

impl UpdateCategory {
    pub fn clean(self) -> Result<UpdateCategory, ApiError> {
        let mut errors = FieldErrors::new();
        if let Some(title) = &self.title {
            check_required(&mut errors, "title", Some(title.as_str()));
            check_len(&mut errors, "title", title, MAX_CHAR_FIELD_LENGTH);
        }
        if let Some(slug) = &self.slug {
            check_slug(&mut errors, slug);
        }
        finish(errors, &self)?;
        Ok(self)
    }
}

impl NewLocation {
    pub fn clean(self) -> Result<NewLocation, ApiError> {
        let mut errors = FieldErrors::new();
        check_required(&mut errors, "name", Some(self.name.as_str()));
        check_len(&mut errors, "name", &self.name, MAX_CHAR_FIELD_LENGTH);
        finish(errors, &self)?;
        Ok(self)
    }
}

impl UpdateLocation {
    pub fn clean(self) -> Result<UpdateLocation, ApiError> {
        let mut errors = FieldErrors::new();
        if let Some(name) = &self.name {
            check_required(&mut errors, "name", Some(name.as_str()));
            check_len(&mut errors, "name", name, MAX_CHAR_FIELD_LENGTH);
        }
        finish(errors, &self)?;
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn errors_of(e: ApiError) -> FieldErrors {
        match e {
            ApiError::Validation { errors, .. } => errors,
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn comment_requires_text() {
        let errors = errors_of(CommentForm { text: Some("   ".into()) }.clean().unwrap_err());
        assert_eq!(errors["text"], vec![REQUIRED.to_string()]);
        assert_eq!(CommentForm { text: Some("nice".into()) }.clean().unwrap(), "nice");
    }

    #[test]
    fn registration_collects_every_problem() {
        let form = RegistrationForm {
            username: Some("bad name!".into()),
            password1: Some("1234".into()),
            password2: Some("4321".into()),
        };
        let errors = errors_of(form.clean().unwrap_err());
        assert!(errors.contains_key("username"));
        assert_eq!(errors["password1"].len(), 2);
        assert!(errors.contains_key("password2"));
    }

    #[test]
    fn registration_does_not_echo_passwords() {
        let form = RegistrationForm { username: Some("anna".into()), password1: Some("x".into()), password2: None };
        match form.clean().unwrap_err() {
            ApiError::Validation { form, .. } => assert!(form.get("password1").is_none()),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn profile_email_checked_only_when_supplied() {
        assert!(ProfileForm { first_name: Some("Anna".into()), ..Default::default() }.clean().is_ok());
        assert!(ProfileForm { email: Some(String::new()), ..Default::default() }.clean().is_ok());
        let errors = errors_of(ProfileForm { email: Some("nope".into()), ..Default::default() }.clean().unwrap_err());
        assert!(errors.contains_key("email"));
    }

    #[test]
    fn slugs_are_restricted() {
        assert!(is_valid_slug("travel_2024-spring"));
        assert!(!is_valid_slug("with space"));
        assert!(!is_valid_slug(""));
    }

    #[test]
    fn slug_and_email_fit_their_columns() {
        let slug = "a".repeat(MAX_SLUG_LENGTH + 1);
        let category = NewCategory { title: "T".into(), description: "D".into(), slug, is_published: true };
        assert!(errors_of(category.clean().unwrap_err()).contains_key("slug"));
        let upd = UpdateCategory { slug: Some("b".repeat(MAX_SLUG_LENGTH + 1)), ..Default::default() };
        assert!(errors_of(upd.clean().unwrap_err()).contains_key("slug"));
        assert!(UpdateCategory { slug: Some("c".repeat(MAX_SLUG_LENGTH)), ..Default::default() }.clean().is_ok());

        let email = format!("{}@example.com", "x".repeat(MAX_EMAIL_LENGTH));
        let errors = errors_of(ProfileForm { email: Some(email), ..Default::default() }.clean().unwrap_err());
        assert!(errors["email"][0].starts_with("Ensure this value has at most 254"));
    }
}
