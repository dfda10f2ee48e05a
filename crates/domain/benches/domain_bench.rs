use common::{RestaurantId, TableId};
use criterion::{Criterion, black_box, criterion_group, criterion_main};
use domain::{
    CartItem, CreateOrderRequest, CustomerInfo, DEFAULT_PLATFORM_FEE_RATE, Money, OrderStatus,
    calculate_totals, generate_order_number, validate_order,
};

fn make_cart(lines: u32) -> Vec<CartItem> {
    (1..=lines)
        .map(|n| {
            CartItem::new(
                format!("item-{n:03}").as_str(),
                format!("Dish {n}"),
                4.5 + f64::from(n),
                n % 4 + 1,
            )
        })
        .collect()
}

fn bench_calculate_totals(c: &mut Criterion) {
    let cart = make_cart(10);

    c.bench_function("domain/calculate_totals_10_lines", |b| {
        b.iter(|| {
            calculate_totals(
                black_box(&cart),
                DEFAULT_PLATFORM_FEE_RATE,
                Money::new(2.0),
                Money::zero(),
            )
        });
    });
}

fn bench_validate_order(c: &mut Criterion) {
    let request = CreateOrderRequest::from_customer(
        RestaurantId::new(),
        TableId::new(),
        make_cart(25),
        CustomerInfo::new("Maya", "555-0101"),
    )
    .with_tip(3.0)
    .with_offer("WELCOME", 5.0);

    c.bench_function("domain/validate_order_25_lines", |b| {
        b.iter(|| validate_order(black_box(&request), DEFAULT_PLATFORM_FEE_RATE).unwrap());
    });
}

fn bench_validate_invalid_order(c: &mut Criterion) {
    let mut request = CreateOrderRequest::from_customer(
        RestaurantId::new(),
        TableId::new(),
        Vec::new(),
        CustomerInfo::new("", ""),
    );
    request.table_id = None;

    c.bench_function("domain/validate_invalid_order", |b| {
        b.iter(|| validate_order(black_box(&request), DEFAULT_PLATFORM_FEE_RATE).unwrap_err());
    });
}

fn bench_order_number(c: &mut Criterion) {
    let now = chrono_now();
    c.bench_function("domain/generate_order_number", |b| {
        b.iter(|| generate_order_number(black_box(now)));
    });
}

fn bench_transition_table(c: &mut Criterion) {
    c.bench_function("domain/transition_table", |b| {
        b.iter(|| {
            let mut allowed = 0;
            for from in OrderStatus::ALL {
                for to in OrderStatus::ALL {
                    if black_box(from).can_transition_to(to) {
                        allowed += 1;
                    }
                }
            }
            allowed
        });
    });
}

fn chrono_now() -> chrono::DateTime<chrono::Utc> {
    chrono::Utc::now()
}

criterion_group!(
    benches,
    bench_calculate_totals,
    bench_validate_order,
    bench_validate_invalid_order,
    bench_order_number,
    bench_transition_table,
);
criterion_main!(benches);
