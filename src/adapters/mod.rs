pub mod api;
pub mod db;
pub mod report_html;
pub mod spot_price;
