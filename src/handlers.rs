use actix_multipart::Multipart;
use actix_web::{web, HttpResponse};
use futures::TryStreamExt;
use mongodb::bson::oid::ObjectId;
use tracing::{debug, info, instrument};

use crate::dto::{
    ContactRequest, ContactResponse, NewsletterRequest, OrderResponse, OrderStatusUpdate,
    ProductListQuery, SubscriptionResponse,
};
use crate::errors::AppError;
use crate::media::Attachment;
use crate::orders::PlaceOrder;
use crate::state::AppState;

fn parse_object_id(id: &str) -> Result<ObjectId, AppError> {
    ObjectId::parse_str(id).map_err(|_| {
        debug!("Invalid ID format: {}", id);
        AppError::BadRequest("Invalid ID format".to_string())
    })
}

fn not_found() -> AppError {
    AppError::NotFound("Not found.".to_string())
}

#[instrument(name = "handler::list_categories", skip(state))]
pub async fn list_categories(state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    let categories = state.catalog.categories().await?;
    info!("Retrieved {} categories", categories.len());
    Ok(HttpResponse::Ok().json(categories))
}

#[instrument(name = "handler::get_category", skip(state))]
pub async fn get_category(
    state: web::Data<AppState>,
    slug: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let category = state.catalog.category_by_slug(&slug).await?;
    Ok(HttpResponse::Ok().json(category))
}

#[instrument(name = "handler::list_products", skip(state))]
pub async fn list_products(
    state: web::Data<AppState>,
    query: web::Query<ProductListQuery>,
) -> Result<HttpResponse, AppError> {
    let page = state.catalog.list_products(&query).await?;
    info!("Retrieved {} of {} products", page.results.len(), page.count);
    Ok(HttpResponse::Ok().json(page))
}

#[instrument(name = "handler::featured_products", skip(state))]
pub async fn featured_products(state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    let products = state.catalog.featured_products().await?;
    Ok(HttpResponse::Ok().json(products))
}

#[instrument(name = "handler::get_product", skip(state))]
pub async fn get_product(
    state: web::Data<AppState>,
    id: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let product = state.catalog.product(&id).await?;
    Ok(HttpResponse::Ok().json(product))
}

#[instrument(name = "handler::products_by_category", skip(state))]
pub async fn products_by_category(
    state: web::Data<AppState>,
    slug: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let products = state.catalog.products_by_category_slug(&slug).await?;
    debug!("Found {} products in category {}", products.len(), slug);
    Ok(HttpResponse::Ok().json(products))
}

fn multipart_error(err: actix_multipart::MultipartError) -> AppError {
    AppError::BadRequest(format!("Invalid multipart payload: {}", err))
}

/// Collects the `platform`, `orderDetails` and `file` fields of an order
/// form. Other fields are skipped.
async fn read_order_form(mut payload: Multipart, max_bytes: usize) -> Result<PlaceOrder, AppError> {
    let mut form = PlaceOrder::default();

    while let Some(mut field) = payload.try_next().await.map_err(multipart_error)? {
        let name = field.name().to_string();
        let filename = field
            .content_disposition()
            .get_filename()
            .map(str::to_owned);

        let mut content = Vec::new();
        while let Some(chunk) = field.try_next().await.map_err(multipart_error)? {
            if content.len() + chunk.len() > max_bytes {
                return Err(AppError::BadRequest(format!(
                    "Field '{}' exceeds the {} byte upload limit",
                    name, max_bytes
                )));
            }
            content.extend_from_slice(&chunk);
        }

        match name.as_str() {
            "platform" => form.platform = Some(String::from_utf8_lossy(&content).into_owned()),
            "orderDetails" => {
                form.order_details = Some(String::from_utf8_lossy(&content).into_owned())
            }
            "file" => {
                if let Some(filename) = filename.filter(|_| !content.is_empty()) {
                    form.attachment = Some(Attachment { filename, content });
                }
            }
            other => debug!("Ignoring form field '{}'", other),
        }
    }

    Ok(form)
}

#[instrument(name = "handler::create_order", skip(state, payload))]
pub async fn create_order(
    state: web::Data<AppState>,
    payload: Multipart,
) -> Result<HttpResponse, AppError> {
    let form = read_order_form(payload, state.max_upload_bytes).await?;
    let order = state.orders.place(form).await?;
    Ok(HttpResponse::Created().json(OrderResponse::new(order, &state.media_url)))
}

#[instrument(name = "handler::list_orders", skip(state))]
pub async fn list_orders(state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    let orders: Vec<OrderResponse> = state
        .records
        .list_orders()
        .await?
        .into_iter()
        .map(|order| OrderResponse::new(order, &state.media_url))
        .collect();
    info!("Retrieved {} orders", orders.len());
    Ok(HttpResponse::Ok().json(orders))
}

#[instrument(name = "handler::get_order", skip(state))]
pub async fn get_order(
    state: web::Data<AppState>,
    id: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let id = parse_object_id(&id)?;
    let order = state.records.get_order(&id).await?.ok_or_else(not_found)?;
    Ok(HttpResponse::Ok().json(OrderResponse::new(order, &state.media_url)))
}

#[instrument(name = "handler::update_order_status", skip(state, request))]
pub async fn update_order_status(
    state: web::Data<AppState>,
    id: web::Path<String>,
    request: web::Json<OrderStatusUpdate>,
) -> Result<HttpResponse, AppError> {
    let id = parse_object_id(&id)?;
    let order = state.orders.update_status(&id, request.into_inner()).await?;
    Ok(HttpResponse::Ok().json(OrderResponse::new(order, &state.media_url)))
}

#[instrument(name = "handler::delete_order", skip(state))]
pub async fn delete_order(
    state: web::Data<AppState>,
    id: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let id = parse_object_id(&id)?;
    state.orders.delete(&id).await?;
    Ok(HttpResponse::NoContent().finish())
}

#[instrument(name = "handler::create_contact", skip(state, request))]
pub async fn create_contact(
    state: web::Data<AppState>,
    request: web::Json<ContactRequest>,
) -> Result<HttpResponse, AppError> {
    let contact = state.submissions.contact(request.into_inner()).await?;
    Ok(HttpResponse::Created().json(ContactResponse::from(contact)))
}

#[instrument(name = "handler::list_contacts", skip(state))]
pub async fn list_contacts(state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    let contacts: Vec<ContactResponse> = state
        .records
        .list_contacts()
        .await?
        .into_iter()
        .map(ContactResponse::from)
        .collect();
    Ok(HttpResponse::Ok().json(contacts))
}

#[instrument(name = "handler::get_contact", skip(state))]
pub async fn get_contact(
    state: web::Data<AppState>,
    id: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let id = parse_object_id(&id)?;
    let contact = state.records.get_contact(&id).await?.ok_or_else(not_found)?;
    Ok(HttpResponse::Ok().json(ContactResponse::from(contact)))
}

#[instrument(name = "handler::delete_contact", skip(state))]
pub async fn delete_contact(
    state: web::Data<AppState>,
    id: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let id = parse_object_id(&id)?;
    if !state.records.delete_contact(&id).await? {
        return Err(not_found());
    }
    info!("Deleted contact message {}", id);
    Ok(HttpResponse::NoContent().finish())
}

#[instrument(name = "handler::subscribe", skip(state, request))]
pub async fn subscribe(
    state: web::Data<AppState>,
    request: web::Json<NewsletterRequest>,
) -> Result<HttpResponse, AppError> {
    let subscription = state.submissions.subscribe(request.into_inner()).await?;
    Ok(HttpResponse::Created().json(SubscriptionResponse::from(subscription)))
}
