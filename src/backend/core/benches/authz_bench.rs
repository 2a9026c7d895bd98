//! Benchmarks for ability construction and evaluation.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use saas_core::rbac::{
    define_ability_for, AbilityBuilder, Action, Condition, Role, Subject, SubjectType, User,
};
use serde_json::json;

fn bench_define_ability(c: &mut Criterion) {
    let mut group = c.benchmark_group("define_ability_for");
    for role in Role::all() {
        let user = User::new("u-1", role);
        group.bench_with_input(BenchmarkId::from_parameter(role), &user, |b, user| {
            b.iter(|| black_box(define_ability_for(user).unwrap()));
        });
    }
    group.finish();
}

fn bench_evaluate(c: &mut Criterion) {
    let admin = define_ability_for(&User::new("u-1", Role::Admin)).unwrap();
    let org = Subject::organization("o-1", "u-2");
    let raw = json!({ "__typename": "Organization", "id": "o-1", "ownerId": "u-2" });

    let mut group = c.benchmark_group("evaluate");
    group.bench_function("typed_instance", |b| {
        b.iter(|| black_box(admin.can(Action::TransferOwnership, black_box(&org))));
    });
    group.bench_function("raw_instance", |b| {
        b.iter(|| black_box(admin.can(Action::TransferOwnership, black_box(&raw))));
    });
    group.bench_function("subject_type", |b| {
        b.iter(|| black_box(admin.can(Action::Update, black_box(SubjectType::Project))));
    });
    group.finish();
}

fn bench_rule_count(c: &mut Criterion) {
    let mut group = c.benchmark_group("evaluate_by_rule_count");
    let project = Subject::project("p-1", "u-2", "o-1");
    for size in [1usize, 10, 100, 1_000] {
        let mut builder = AbilityBuilder::new(User::new("u-1", Role::Member));
        for _ in 0..size {
            builder.grant_if(Action::Update, SubjectType::Project, Condition::owner());
        }
        builder.deny_if(Action::Update, SubjectType::Project, Condition::not_owner());
        let ability = builder.build().unwrap();

        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &ability, |b, ability| {
            b.iter(|| black_box(ability.evaluate(Action::Update, black_box(&project))));
        });
    }
    group.finish();
}

criterion_group!(benches, bench_define_ability, bench_evaluate, bench_rule_count);
criterion_main!(benches);
