use axum::{
    async_trait,
    extract::{FromRequest, Multipart, Request},
};
use base64ct::{Base64, Encoding};
use bytes::Bytes;
use serde::{Deserialize, Deserializer, Serialize};

use crate::body::{content_type, JsonOrForm};
use crate::error::ApiError;
use crate::users::repo_types::PublicUser;

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub search: Option<String>,
}

/// Wraps a present value (including `null`) in `Some`, so a missing key stays `None`.
fn present<'de, D, T>(de: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(de).map(Some)
}

/// JSON or urlencoded user body.
#[derive(Debug, Default, Deserialize)]
pub struct UserPayload {
    pub username: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    #[serde(default, deserialize_with = "present")]
    pub image: Option<Option<String>>,
}

#[derive(Debug, Clone)]
pub struct Upload {
    pub content_type: String,
    pub data: Bytes,
}

impl Upload {
    /// `data:<mime>;base64,<payload>`
    pub fn to_data_uri(&self) -> String {
        format!(
            "data:{};base64,{}",
            self.content_type,
            Base64::encode_string(&self.data)
        )
    }
}

/// Create/update body after content negotiation.
#[derive(Debug, Default)]
pub struct UserForm {
    pub username: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    /// Text `image` value; `Some(None)` is an explicit JSON `null`.
    pub image: Option<Option<String>>,
    /// Uploaded `image` file; wins over the text value.
    pub upload: Option<Upload>,
}

impl From<UserPayload> for UserForm {
    fn from(p: UserPayload) -> Self {
        Self {
            username: p.username,
            email: p.email,
            password: p.password,
            image: p.image,
            upload: None,
        }
    }
}

/// What an update does to the stored image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageChange {
    Keep,
    Clear,
    Set(String),
}

/// Validated input for creating a user.
#[derive(Debug)]
pub struct CreateUser {
    pub username: String,
    pub email: String,
    pub password: String,
    pub image: Option<String>,
}

/// Validated partial update. `None` fields are left untouched.
#[derive(Debug)]
pub struct UpdateUser {
    pub username: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub image: ImageChange,
}

fn non_empty(field: &str, value: Option<String>) -> Result<Option<String>, ApiError> {
    match value {
        Some(v) if v.is_empty() => Err(ApiError::validation(format!("{field} must not be empty"))),
        other => Ok(other),
    }
}

impl UserForm {
    fn image_change(&self) -> ImageChange {
        if let Some(upload) = &self.upload {
            return ImageChange::Set(upload.to_data_uri());
        }
        match &self.image {
            None => ImageChange::Keep,
            Some(None) => ImageChange::Clear,
            Some(Some(s)) if s.is_empty() => ImageChange::Keep,
            Some(Some(s)) => ImageChange::Set(s.clone()),
        }
    }

    pub fn into_create(self) -> Result<CreateUser, ApiError> {
        let image = match self.image_change() {
            ImageChange::Set(s) => Some(s),
            ImageChange::Keep | ImageChange::Clear => None,
        };
        match (self.username, self.email, self.password) {
            (Some(username), Some(email), Some(password))
                if !username.is_empty() && !email.is_empty() && !password.is_empty() =>
            {
                Ok(CreateUser {
                    username,
                    email,
                    password,
                    image,
                })
            }
            _ => Err(ApiError::validation("Missing fields")),
        }
    }

    pub fn into_update(self) -> Result<UpdateUser, ApiError> {
        let image = self.image_change();
        Ok(UpdateUser {
            username: non_empty("username", self.username)?,
            email: non_empty("email", self.email)?,
            password: non_empty("password", self.password)?,
            image,
        })
    }
}

fn is_multipart(req: &Request) -> bool {
    content_type(req).is_some_and(|ct| ct.starts_with("multipart/form-data"))
}

async fn read_multipart(mut mp: Multipart) -> Result<UserForm, ApiError> {
    let mut form = UserForm::default();
    while let Some(field) = mp
        .next_field()
        .await
        .map_err(|e| ApiError::validation(e.body_text()))?
    {
        let name = field.name().unwrap_or_default().to_string();
        let file_name = field.file_name().map(str::to_string);
        let content_type = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();

        if name == "image" && file_name.is_some() {
            let data = field
                .bytes()
                .await
                .map_err(|e| ApiError::validation(e.body_text()))?;
            // Browsers send an empty part when no file was picked.
            if data.is_empty() && file_name.as_deref() == Some("") {
                continue;
            }
            form.upload = Some(Upload { content_type, data });
            continue;
        }

        let value = field
            .text()
            .await
            .map_err(|e| ApiError::validation(e.body_text()))?;
        match name.as_str() {
            "username" => form.username = Some(value),
            "email" => form.email = Some(value),
            "password" => form.password = Some(value),
            "image" => form.image = Some(Some(value)),
            _ => {}
        }
    }
    Ok(form)
}

#[async_trait]
impl<S> FromRequest<S> for UserForm
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        if is_multipart(&req) {
            let mp = Multipart::from_request(req, state)
                .await
                .map_err(|e| ApiError::validation(e.body_text()))?;
            return read_multipart(mp).await;
        }
        let JsonOrForm(payload) = JsonOrForm::<UserPayload>::from_request(req, state).await?;
        Ok(payload.into())
    }
}

/// `{message, user}` envelope for create and update.
#[derive(Debug, Serialize)]
pub struct UserEnvelope {
    pub message: &'static str,
    pub user: PublicUser,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(json: &str) -> UserForm {
        serde_json::from_str::<UserPayload>(json).unwrap().into()
    }

    #[test]
    fn data_uri_encodes_mime_and_payload() {
        let upload = Upload {
            content_type: "image/png".into(),
            data: Bytes::from_static(b"hello"),
        };
        assert_eq!(upload.to_data_uri(), "data:image/png;base64,aGVsbG8=");
    }

    #[test]
    fn create_requires_all_fields() {
        let err = payload(r#"{"username":"bob","email":"b@x.com"}"#)
            .into_create()
            .unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));

        let err = payload(r#"{"username":"","email":"b@x.com","password":"pw"}"#)
            .into_create()
            .unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
    }

    #[test]
    fn create_keeps_external_image_reference() {
        let input = payload(
            r#"{"username":"bob","email":"b@x.com","password":"pw","image":"https://cdn/x.png"}"#,
        )
        .into_create()
        .unwrap();
        assert_eq!(input.image.as_deref(), Some("https://cdn/x.png"));
    }

    #[test]
    fn upload_takes_precedence_over_text_image() {
        let mut form = payload(r#"{"image":"https://cdn/x.png"}"#);
        form.upload = Some(Upload {
            content_type: "image/jpeg".into(),
            data: Bytes::from_static(&[0xff, 0xd8]),
        });
        let update = form.into_update().unwrap();
        assert_eq!(update.image, ImageChange::Set("data:image/jpeg;base64,/9g=".into()));
    }

    #[test]
    fn update_distinguishes_absent_null_and_empty_image() {
        assert_eq!(payload("{}").into_update().unwrap().image, ImageChange::Keep);
        assert_eq!(
            payload(r#"{"image":null}"#).into_update().unwrap().image,
            ImageChange::Clear
        );
        assert_eq!(
            payload(r#"{"image":""}"#).into_update().unwrap().image,
            ImageChange::Keep
        );
    }

    #[test]
    fn update_rejects_explicit_empty_strings() {
        for body in [
            r#"{"username":""}"#,
            r#"{"email":""}"#,
            r#"{"password":""}"#,
        ] {
            let err = payload(body).into_update().unwrap_err();
            assert!(matches!(err, ApiError::Validation(_)), "{body}");
        }
    }

    #[test]
    fn update_with_only_email_touches_nothing_else() {
        let update = payload(r#"{"email":"new@x.com"}"#).into_update().unwrap();
        assert_eq!(update.email.as_deref(), Some("new@x.com"));
        assert!(update.username.is_none());
        assert!(update.password.is_none());
        assert_eq!(update.image, ImageChange::Keep);
    }
}
