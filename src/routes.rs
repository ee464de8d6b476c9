use actix_web::{error::JsonPayloadError, get, post, web, HttpRequest, HttpResponse};
use serde::Deserialize;

use crate::balance::balance_sheet;
use crate::error::{ApiError, ValidationError};
use crate::exchange::get_exchanges;
use crate::identity::resolve_user;
use crate::report::balance_sheet_csv;
use crate::schemas::{ExpenseInput, ExpenseView, NewUser, UserView};
use crate::split::prepare_expense;
use crate::store::{user_directory, Repository};

type Repo = web::Data<dyn Repository>;

#[derive(Deserialize)]
struct IdentifierQuery {
    identifier: Option<String>,
}

impl IdentifierQuery {
    fn required(&self) -> Result<&str, ValidationError> {
        self.identifier
            .as_deref()
            .map(str::trim)
            .filter(|identifier| !identifier.is_empty())
            .ok_or(ValidationError::MissingIdentifier)
    }
}

#[derive(Deserialize)]
struct PageQuery {
    page: Option<String>,
    limit: Option<String>,
}

impl PageQuery {
    /// Returns `(skip, limit)`; `page` defaults to 1 and `limit` to 10.
    fn bounds(&self) -> Result<(u64, i64), ValidationError> {
        let page = parse_positive(self.page.as_deref(), 1).ok_or(ValidationError::InvalidPage)?;
        let limit =
            parse_positive(self.limit.as_deref(), 10).ok_or(ValidationError::InvalidLimit)?;
        let skip = (page - 1)
            .checked_mul(limit)
            .ok_or(ValidationError::InvalidPage)?;
        Ok((skip, limit as i64))
    }
}

fn parse_positive(raw: Option<&str>, default: u64) -> Option<u64> {
    match raw {
        None => Some(default),
        Some(raw) => raw
            .trim()
            .parse::<u64>()
            .ok()
            .filter(|n| *n >= 1 && *n <= i64::MAX as u64),
    }
}

#[post("/users")]
async fn create_user(repo: Repo, json: web::Json<NewUser>) -> Result<HttpResponse, ApiError> {
    let user = json.into_inner().normalized()?.into_user();
    let user = repo.insert_user(user).await?;
    tracing::info!("Registered user {} ({})", user.email, user.id);
    Ok(HttpResponse::Created().json(UserView::from(&user)))
}

#[get("/users")]
async fn get_user(
    repo: Repo,
    query: web::Query<IdentifierQuery>,
) -> Result<HttpResponse, ApiError> {
    let user = resolve_user(repo.get_ref(), query.required()?).await?;
    Ok(HttpResponse::Ok().json(UserView::from(&user)))
}

#[post("/expenses")]
async fn add_expense(
    repo: Repo,
    json: web::Json<ExpenseInput>,
) -> Result<HttpResponse, ApiError> {
    let (expense, directory) = prepare_expense(repo.get_ref(), json.into_inner()).await?;
    let expense = repo.insert_expense(expense).await?;
    tracing::info!(
        "Recorded {} expense {} of {:.2}",
        expense.split_type,
        expense.id,
        expense.amount
    );
    Ok(HttpResponse::Created().json(ExpenseView::render(&expense, &directory)))
}

#[get("/expenses/user")]
async fn user_expenses(
    repo: Repo,
    query: web::Query<IdentifierQuery>,
) -> Result<HttpResponse, ApiError> {
    let user = resolve_user(repo.get_ref(), query.required()?)
        .await
        .map_err(|err| match err {
            ApiError::Identity(err) => ApiError::identity_in("Invalid identifier", err),
            other => other,
        })?;
    let expenses = repo.find_expenses_for_user(&user.id).await?;
    let directory = user_directory(repo.get_ref(), &expenses).await?;
    let views: Vec<ExpenseView> = expenses
        .iter()
        .map(|expense| ExpenseView::render(expense, &directory))
        .collect();
    Ok(HttpResponse::Ok().json(views))
}

#[get("/expenses")]
async fn list_expenses(
    repo: Repo,
    query: web::Query<PageQuery>,
) -> Result<HttpResponse, ApiError> {
    let (skip, limit) = query.bounds()?;
    let expenses = repo.list_expenses(skip, limit).await?;
    let directory = user_directory(repo.get_ref(), &expenses).await?;
    let views: Vec<ExpenseView> = expenses
        .iter()
        .map(|expense| ExpenseView::render(expense, &directory))
        .collect();
    Ok(HttpResponse::Ok().json(views))
}

#[get("/balancesheet/download")]
async fn download_balance_sheet(repo: Repo) -> Result<HttpResponse, ApiError> {
    let users = repo.list_users().await?;
    let expenses = repo.list_all_expenses().await?;
    let csv = balance_sheet_csv(&balance_sheet(&users, &expenses))?;
    tracing::info!("Generated balance sheet for {} users", users.len());
    Ok(HttpResponse::Ok()
        .content_type("text/csv")
        .insert_header(("Content-Description", "File Transfer"))
        .insert_header((
            "Content-Disposition",
            "attachment; filename=balance_sheet.csv",
        ))
        .body(csv))
}

#[get("/balancesheet/settlements")]
async fn settlements(repo: Repo) -> Result<HttpResponse, ApiError> {
    let expenses = repo.list_all_expenses().await?;
    let directory = user_directory(repo.get_ref(), &expenses).await?;
    Ok(HttpResponse::Ok().json(get_exchanges(&expenses, &directory)))
}

fn json_error(err: JsonPayloadError, _req: &HttpRequest) -> actix_web::Error {
    ApiError::from(ValidationError::Malformed(err.to_string())).into()
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::JsonConfig::default().error_handler(json_error))
        .service(create_user)
        .service(get_user)
        .service(add_expense)
        .service(user_expenses)
        .service(list_expenses)
        .service(download_balance_sheet)
        .service(settlements);
}
